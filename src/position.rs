use std::fmt;
use std::str::FromStr;

use crate::amount::CurrencyAmount;
use crate::error::{BuildError, InputError};
use crate::store::{AppAction, Store};
use crate::tokens::Currency;

pub const DEFAULT_LEVERAGE: u32 = 1;
pub const DEFAULT_SLIPPAGE: &str = "1";
pub const DEFAULT_TXN_DEADLINE: &str = "30";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSide {
    Long,
    Short,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => f.write_str("LONG"),
            PositionSide::Short => f.write_str("SHORT"),
        }
    }
}

impl FromStr for PositionSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" => Ok(PositionSide::Long),
            "short" => Ok(PositionSide::Short),
            other => Err(format!("unknown position side: {other}")),
        }
    }
}

/// Slippage tolerance (percent) and deadline (minutes), as typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnSettings {
    pub slippage: String,
    pub deadline: String,
}

impl Default for TxnSettings {
    fn default() -> Self {
        Self {
            slippage: DEFAULT_SLIPPAGE.to_string(),
            deadline: DEFAULT_TXN_DEADLINE.to_string(),
        }
    }
}

/// What the user has entered on the build form. Fields are stored verbatim;
/// validation happens in [`derive_input`] and [`check_build_preconditions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionState {
    pub leverage_value: u32,
    pub position_side: Option<PositionSide>,
    pub input_value: String,
    pub input_currency: Option<Currency>,
    pub slippage_value: String,
    pub txn_deadline: String,
}

impl PositionState {
    pub fn new(defaults: &TxnSettings) -> Self {
        Self {
            leverage_value: DEFAULT_LEVERAGE,
            position_side: None,
            input_value: String::new(),
            input_currency: None,
            slippage_value: defaults.slippage.clone(),
            txn_deadline: defaults.deadline.clone(),
        }
    }

    pub fn reduce(&mut self, action: PositionAction, defaults: &TxnSettings) {
        match action {
            PositionAction::TypeInput(text) => self.input_value = text,
            PositionAction::SetLeverage(value) => self.leverage_value = value,
            PositionAction::SetPositionSide(side) => self.position_side = Some(side),
            PositionAction::SelectInputCurrency(currency) => self.input_currency = Some(currency),
            PositionAction::SetSlippage(text) => self.slippage_value = text,
            PositionAction::SetTxnDeadline(text) => self.txn_deadline = text,
            PositionAction::ResetTxnSettings => {
                self.slippage_value = defaults.slippage.clone();
                self.txn_deadline = defaults.deadline.clone();
            }
        }
    }
}

impl Default for PositionState {
    fn default() -> Self {
        Self::new(&TxnSettings::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionAction {
    TypeInput(String),
    SetLeverage(u32),
    SetPositionSide(PositionSide),
    SelectInputCurrency(Currency),
    SetSlippage(String),
    SetTxnDeadline(String),
    ResetTxnSettings,
}

/// The typed amount, resolved against the selected currency and balance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedInput {
    pub parsed_amount: Option<CurrencyAmount>,
    pub error: Option<InputError>,
}

impl ParsedInput {
    fn failed(error: InputError) -> Self {
        Self {
            parsed_amount: None,
            error: Some(error),
        }
    }
}

/// Resolves raw input text into an amount. Empty text is neutral; every
/// other failure carries an error. When `balance` is known the amount may
/// not exceed it.
pub fn derive_input(raw: &str, currency: Option<&Currency>, balance: Option<&CurrencyAmount>) -> ParsedInput {
    if raw.is_empty() {
        return ParsedInput::default();
    }
    let Some(currency) = currency else {
        return ParsedInput::failed(InputError::NoCurrency);
    };

    let amount = match CurrencyAmount::parse(raw, currency.clone()) {
        Ok(amount) => amount,
        Err(e) => return ParsedInput::failed(e),
    };
    if amount.is_zero() {
        return ParsedInput::failed(InputError::ZeroAmount);
    }
    if balance.is_some_and(|balance| balance.less_than(&amount)) {
        return ParsedInput::failed(InputError::InsufficientBalance);
    }

    ParsedInput {
        parsed_amount: Some(amount),
        error: None,
    }
}

/// Text for a quick-input button: `pct` percent of `max`, exact at the
/// currency's precision.
pub fn percentage_input(max: Option<&CurrencyAmount>, pct: u64) -> Option<String> {
    Some(max?.multiply(pct).divide(100)?.to_exact())
}

/// Everything a position needs before approval can be attempted.
pub fn check_build_preconditions(state: &PositionState) -> Result<(), BuildError> {
    if state.input_value.is_empty() {
        return Err(BuildError::MissingInputSize);
    }
    if state.position_side.is_none() {
        return Err(BuildError::MissingPositionSide);
    }
    if state.leverage_value == 0 {
        return Err(BuildError::MissingLeverage);
    }
    Ok(())
}

/// Input handlers bound to a store.
#[derive(Clone)]
pub struct PositionActionHandlers {
    store: Store,
}

impl PositionActionHandlers {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn dispatch(&self, action: PositionAction) {
        self.store.dispatch(AppAction::Position(action));
    }

    pub fn on_amount_input(&self, text: impl Into<String>) {
        self.dispatch(PositionAction::TypeInput(text.into()));
    }

    pub fn on_leverage_input(&self, value: u32) {
        self.dispatch(PositionAction::SetLeverage(value));
    }

    pub fn on_position_side_input(&self, side: PositionSide) {
        self.dispatch(PositionAction::SetPositionSide(side));
    }

    pub fn on_currency_selection(&self, currency: Currency) {
        self.dispatch(PositionAction::SelectInputCurrency(currency));
    }

    pub fn on_slippage_input(&self, text: impl Into<String>) {
        self.dispatch(PositionAction::SetSlippage(text.into()));
    }

    pub fn on_txn_deadline_input(&self, text: impl Into<String>) {
        self.dispatch(PositionAction::SetTxnDeadline(text.into()));
    }

    pub fn on_reset_txn_settings(&self) {
        self.dispatch(PositionAction::ResetTxnSettings);
    }

    /// Fills the amount with `pct` percent of `max`. Does nothing while the
    /// max is unknown. Returns the text that was entered.
    pub fn on_percentage_input(&self, max: Option<&CurrencyAmount>, pct: u64) -> Option<String> {
        let text = percentage_input(max, pct)?;
        self.on_amount_input(text.clone());
        Some(text)
    }

    pub fn on_max_input(&self, max: Option<&CurrencyAmount>) -> Option<String> {
        let text = max?.to_exact();
        self.on_amount_input(text.clone());
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AppState;
    use crate::tokens::TokenIdentity;
    use ethers::types::U256;

    fn ovl() -> Currency {
        Currency::Token(TokenIdentity::new(
            1,
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            18,
            "OVL",
        ))
    }

    fn units(n: u64) -> CurrencyAmount {
        CurrencyAmount::from_raw(ovl(), U256::from(n) * U256::exp10(18))
    }

    #[test]
    fn initial_state_uses_defaults() {
        let state = PositionState::default();
        assert_eq!(state.input_value, "");
        assert_eq!(state.position_side, None);
        assert_eq!(state.leverage_value, 1);
        assert_eq!(state.slippage_value, "1");
        assert_eq!(state.txn_deadline, "30");
    }

    #[test]
    fn reducer_stores_fields_verbatim() {
        let defaults = TxnSettings::default();
        let mut state = PositionState::new(&defaults);
        state.reduce(PositionAction::TypeInput("12.x".into()), &defaults);
        state.reduce(PositionAction::SetLeverage(50), &defaults);
        state.reduce(PositionAction::SetPositionSide(PositionSide::Short), &defaults);
        state.reduce(PositionAction::SetSlippage("0.5".into()), &defaults);
        state.reduce(PositionAction::SetTxnDeadline("abc".into()), &defaults);

        assert_eq!(state.input_value, "12.x");
        assert_eq!(state.leverage_value, 50);
        assert_eq!(state.position_side, Some(PositionSide::Short));
        assert_eq!(state.slippage_value, "0.5");
        assert_eq!(state.txn_deadline, "abc");
    }

    #[test]
    fn reset_restores_configured_txn_defaults_only() {
        let defaults = TxnSettings {
            slippage: "0.3".into(),
            deadline: "20".into(),
        };
        let mut state = PositionState::new(&defaults);
        state.reduce(PositionAction::SetSlippage("5".into()), &defaults);
        state.reduce(PositionAction::SetTxnDeadline("99".into()), &defaults);
        state.reduce(PositionAction::TypeInput("7".into()), &defaults);
        state.reduce(PositionAction::ResetTxnSettings, &defaults);

        assert_eq!(state.slippage_value, "0.3");
        assert_eq!(state.txn_deadline, "20");
        assert_eq!(state.input_value, "7");
    }

    #[test]
    fn empty_input_is_neutral() {
        assert_eq!(derive_input("", Some(&ovl()), None), ParsedInput::default());
        assert_eq!(derive_input("", None, None), ParsedInput::default());
    }

    #[test]
    fn unparsable_input_is_an_error() {
        let parsed = derive_input("abc", Some(&ovl()), None);
        assert!(parsed.parsed_amount.is_none());
        assert_eq!(parsed.error, Some(InputError::InvalidInput));
    }

    #[test]
    fn zero_and_missing_currency_are_errors() {
        assert_eq!(derive_input("0.000", Some(&ovl()), None).error, Some(InputError::ZeroAmount));
        assert_eq!(derive_input("1", None, None).error, Some(InputError::NoCurrency));
    }

    #[test]
    fn sufficient_balance_yields_parsed_amount() {
        let balance = units(20);
        let parsed = derive_input("10", Some(&ovl()), Some(&balance));
        assert_eq!(parsed.error, None);
        assert_eq!(parsed.parsed_amount.unwrap().raw(), U256::from(10) * U256::exp10(18));
    }

    #[test]
    fn amount_above_balance_is_insufficient() {
        let balance = units(20);
        let doubled = (20 * 2).to_string();
        let parsed = derive_input(&doubled, Some(&ovl()), Some(&balance));
        assert_eq!(parsed.error, Some(InputError::InsufficientBalance));
        assert!(parsed.parsed_amount.is_none());

        let exact = derive_input("20", Some(&ovl()), Some(&balance));
        assert!(exact.error.is_none());
    }

    #[test]
    fn unknown_balance_does_not_cap_the_amount() {
        let parsed = derive_input("1000000", Some(&ovl()), None);
        assert!(parsed.parsed_amount.is_some());
    }

    #[test]
    fn preconditions_are_checked_in_order() {
        let mut state = PositionState::default();
        assert!(matches!(check_build_preconditions(&state), Err(BuildError::MissingInputSize)));

        state.input_value = "5".into();
        let err = check_build_preconditions(&state).unwrap_err();
        assert_eq!(err.to_string(), "please choose a long/short position");

        state.position_side = Some(PositionSide::Long);
        state.leverage_value = 0;
        assert!(matches!(check_build_preconditions(&state), Err(BuildError::MissingLeverage)));

        state.leverage_value = 3;
        assert!(check_build_preconditions(&state).is_ok());
    }

    #[test]
    fn quick_inputs_write_exact_text_into_the_store() {
        let store = Store::new(AppState::default(), TxnSettings::default());
        let handlers = PositionActionHandlers::new(store.clone());
        let max = units(100);

        assert_eq!(handlers.on_percentage_input(Some(&max), 75).as_deref(), Some("75"));
        assert_eq!(store.state().position.input_value, "75");

        handlers.on_percentage_input(Some(&max), 25);
        assert_eq!(store.state().position.input_value, "25");

        handlers.on_max_input(Some(&max));
        assert_eq!(store.state().position.input_value, "100");
    }

    #[test]
    fn quick_inputs_without_a_max_leave_the_input_alone() {
        let store = Store::new(AppState::default(), TxnSettings::default());
        let handlers = PositionActionHandlers::new(store.clone());
        handlers.on_amount_input("3");

        assert!(handlers.on_percentage_input(None, 50).is_none());
        assert!(handlers.on_max_input(None).is_none());
        assert_eq!(store.state().position.input_value, "3");
    }

    #[test]
    fn handlers_dispatch_side_and_leverage() {
        let store = Store::new(AppState::default(), TxnSettings::default());
        let handlers = PositionActionHandlers::new(store.clone());
        handlers.on_position_side_input(PositionSide::Long);
        handlers.on_leverage_input(4);
        handlers.on_currency_selection(ovl());

        let position = store.state().position;
        assert_eq!(position.position_side, Some(PositionSide::Long));
        assert_eq!(position.leverage_value, 4);
        assert_eq!(position.input_currency, Some(ovl()));
    }

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("Long".parse::<PositionSide>(), Ok(PositionSide::Long));
        assert_eq!("SHORT".parse::<PositionSide>(), Ok(PositionSide::Short));
        assert!("flat".parse::<PositionSide>().is_err());
    }
}
