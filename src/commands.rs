use ethers::types::Address;
use std::fmt::Write as _;

use crate::address::{checksum, is_address};
use crate::multicall::BatchReader;
use crate::position::PositionSide;
use crate::session::{ApprovalOutcome, Session};

pub const HELP: &str = "\
commands:
  long | short              choose the position side
  leverage <n>              set leverage
  amount <value>            type a collateral amount (empty clears)
  25% | 50% | 75% | max     fill the amount from the balance
  slippage <pct>            set slippage tolerance
  deadline <minutes>        set transaction deadline
  reset                     restore default slippage and deadline
  account <address|none>    watch another account
  build                     validate the form and approve collateral
  status                    show the form and balances
  help                      show this text
  quit                      exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Side(PositionSide),
    Leverage(u32),
    Amount(String),
    Percent(u64),
    Max,
    Slippage(String),
    Deadline(String),
    Reset,
    Account(Option<Address>),
    Build,
    Status,
    Help,
    Quit,
}

/// Parses one input line. Amount, slippage and deadline text is passed
/// through untouched; it is validated later, like typed input.
pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    match word.to_ascii_lowercase().as_str() {
        "long" | "short" => Ok(Command::Side(word.parse()?)),
        "leverage" => rest
            .parse()
            .map(Command::Leverage)
            .map_err(|_| format!("invalid leverage: {rest:?}")),
        "amount" => Ok(Command::Amount(rest.to_string())),
        "25%" => Ok(Command::Percent(25)),
        "50%" => Ok(Command::Percent(50)),
        "75%" => Ok(Command::Percent(75)),
        "max" => Ok(Command::Max),
        "slippage" => Ok(Command::Slippage(rest.to_string())),
        "deadline" => Ok(Command::Deadline(rest.to_string())),
        "reset" => Ok(Command::Reset),
        "account" if rest.eq_ignore_ascii_case("none") => Ok(Command::Account(None)),
        "account" => is_address(rest)
            .map(|a| Command::Account(Some(a)))
            .ok_or_else(|| format!("invalid address: {rest:?}")),
        "build" => Ok(Command::Build),
        "status" | "" => Ok(Command::Status),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command: {other}")),
    }
}

/// Runs a command against the session and returns what to print.
pub async fn execute<R: BatchReader>(session: &Session<R>, command: Command) -> String {
    let handlers = session.handlers();
    match command {
        Command::Side(side) => {
            handlers.on_position_side_input(side);
            format!("side: {side}")
        }
        Command::Leverage(value) => {
            handlers.on_leverage_input(value);
            format!("leverage: {value}x")
        }
        Command::Amount(text) => {
            handlers.on_amount_input(text);
            render_input(session).await
        }
        Command::Percent(pct) => match session.on_percentage_input(pct).await {
            Some(_) => render_input(session).await,
            None => "balance not loaded yet".to_string(),
        },
        Command::Max => match session.on_max_input().await {
            Some(_) => render_input(session).await,
            None => "balance not loaded yet".to_string(),
        },
        Command::Slippage(text) => {
            handlers.on_slippage_input(text.clone());
            format!("slippage: {text}%")
        }
        Command::Deadline(text) => {
            handlers.on_txn_deadline_input(text.clone());
            format!("deadline: {text} min")
        }
        Command::Reset => {
            handlers.on_reset_txn_settings();
            let defaults = session.store().txn_defaults();
            format!("slippage: {}%, deadline: {} min", defaults.slippage, defaults.deadline)
        }
        Command::Account(account) => {
            session.switch_account(account).await;
            match account {
                Some(a) => format!("watching {}", checksum(&a)),
                None => "no account".to_string(),
            }
        }
        Command::Build => match session.attempt_to_approve().await {
            Ok(ApprovalOutcome::AlreadyApproved) => "collateral approved, ready to build".to_string(),
            Ok(ApprovalOutcome::AwaitingConfirmation) => "approval pending confirmation".to_string(),
            Ok(ApprovalOutcome::Submitted(hash)) => format!("approval submitted: {hash:#x}"),
            Err(e) => format!("error: {e}"),
        },
        Command::Status => render_status(session).await,
        Command::Help => HELP.to_string(),
        Command::Quit => String::new(),
    }
}

async fn render_input<R: BatchReader>(session: &Session<R>) -> String {
    let input = session.store().with_state(|s| s.position.input_value.clone());
    match session.derived_input().await.error {
        Some(e) => format!("amount: {input:?} ({e})"),
        None => format!("amount: {input:?}"),
    }
}

pub async fn render_status<R: BatchReader>(session: &Session<R>) -> String {
    let position = session.store().with_state(|s| s.position.clone());
    let context = session.context().await;
    let parsed = session.derived_input().await;
    let balance = session.input_balance().await;
    let native = session.native_balances().await;
    let loading = session.tracker().is_loading().await;

    let mut out = String::new();
    let account = context.account.map(|a| checksum(&a)).unwrap_or_else(|| "-".into());
    let _ = writeln!(out, "account:   {account} (chain {:?})", context.chain_id);
    for amount in native.values() {
        let _ = writeln!(out, "native:    {} {}", amount.to_exact(), amount.currency().symbol());
    }
    let symbol = position
        .input_currency
        .as_ref()
        .map(|c| c.symbol().to_string())
        .unwrap_or_else(|| "-".into());
    match (&balance, loading) {
        (Some(b), _) => {
            let _ = writeln!(out, "balance:   {} {symbol}", b.to_exact());
        }
        (None, true) => {
            let _ = writeln!(out, "balance:   loading");
        }
        (None, false) => {
            let _ = writeln!(out, "balance:   unavailable");
        }
    }
    let side = position.position_side.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
    let _ = writeln!(out, "side:      {side}");
    let _ = writeln!(out, "leverage:  {}x", position.leverage_value);
    let _ = write!(out, "amount:    {:?} {symbol}", position.input_value);
    if let Some(e) = parsed.error {
        let _ = write!(out, " ({e})");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "slippage:  {}%", position.slippage_value);
    let _ = write!(out, "deadline:  {} min", position.txn_deadline);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balances::tests::FakeReader;
    use crate::position::TxnSettings;
    use crate::store::{AppState, Store};
    use crate::tracker::BalanceTracker;
    use std::sync::Arc;

    #[test]
    fn parses_form_commands() {
        assert_eq!(parse("long"), Ok(Command::Side(PositionSide::Long)));
        assert_eq!(parse("  SHORT "), Ok(Command::Side(PositionSide::Short)));
        assert_eq!(parse("leverage 3"), Ok(Command::Leverage(3)));
        assert_eq!(parse("amount 12.5"), Ok(Command::Amount("12.5".into())));
        assert_eq!(parse("amount"), Ok(Command::Amount(String::new())));
        assert_eq!(parse("75%"), Ok(Command::Percent(75)));
        assert_eq!(parse("max"), Ok(Command::Max));
        assert_eq!(parse("slippage 0.5"), Ok(Command::Slippage("0.5".into())));
        assert_eq!(parse("deadline 20"), Ok(Command::Deadline("20".into())));
        assert_eq!(parse(""), Ok(Command::Status));
    }

    #[test]
    fn amount_text_is_not_validated_by_the_parser() {
        assert_eq!(parse("amount abc"), Ok(Command::Amount("abc".into())));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse("leverage high").is_err());
        assert!(parse("account 0x1234").is_err());
        assert!(parse("sideways").is_err());
    }

    #[test]
    fn parses_account_switches() {
        let lower = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
        assert_eq!(parse(&format!("account {lower}")), Ok(Command::Account(is_address(lower))));
        assert_eq!(parse("account none"), Ok(Command::Account(None)));
    }

    #[tokio::test]
    async fn execute_updates_the_form() {
        let tracker = Arc::new(BalanceTracker::new(FakeReader::default(), 1));
        let store = Store::new(AppState::default(), TxnSettings::default());
        let session = Session::new(store.clone(), tracker, None);

        execute(&session, Command::Side(PositionSide::Short)).await;
        execute(&session, Command::Leverage(4)).await;
        let out = execute(&session, Command::Amount("abc".into())).await;
        assert!(out.contains("select a currency"));

        let out = execute(&session, Command::Percent(50)).await;
        assert_eq!(out, "balance not loaded yet");

        let status = render_status(&session).await;
        assert!(status.contains("side:      SHORT"));
        assert!(status.contains("leverage:  4x"));
    }
}
