use ethers::types::{Address, H256, U256};
use std::sync::Arc;

use crate::address::checksum;
use crate::amount::{max_amount_spend, CurrencyAmount};
use crate::approval::{approval_state, ApprovalState, ApprovalSubmitter};
use crate::balances::{BalanceRecord, WalletContext};
use crate::error::BuildError;
use crate::multicall::BatchReader;
use crate::position::{check_build_preconditions, derive_input, ParsedInput, PositionActionHandlers};
use crate::store::Store;
use crate::tokens::Currency;
use crate::tracker::BalanceTracker;
use crate::transactions::{ApprovalInfo, TransactionAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    AlreadyApproved,
    AwaitingConfirmation,
    Submitted(H256),
}

/// One connected user working on the build form.
pub struct Session<R> {
    store: Store,
    handlers: PositionActionHandlers,
    tracker: Arc<BalanceTracker<R>>,
    approver: Option<Arc<dyn ApprovalSubmitter>>,
}

impl<R: BatchReader> Session<R> {
    pub fn new(store: Store, tracker: Arc<BalanceTracker<R>>, approver: Option<Arc<dyn ApprovalSubmitter>>) -> Self {
        Self {
            handlers: PositionActionHandlers::new(store.clone()),
            store,
            tracker,
            approver,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn handlers(&self) -> &PositionActionHandlers {
        &self.handlers
    }

    pub fn tracker(&self) -> &BalanceTracker<R> {
        &self.tracker
    }

    pub async fn context(&self) -> WalletContext {
        self.tracker.context().await
    }

    /// Switches the active account; balances for the previous one are dropped.
    pub async fn switch_account(&self, account: Option<Address>) -> bool {
        let mut context = self.tracker.context().await;
        context.account = account;
        self.tracker.set_context(context).await
    }

    /// Balance of the currency selected in the form, if known. Tokens come
    /// from the tracked record; the native balance is read on demand.
    pub async fn input_balance(&self) -> Option<CurrencyAmount> {
        let currency = self.store.with_state(|s| s.position.input_currency.clone())?;
        match currency {
            Currency::Token(token) => self.tracker.token_balance(&token).await,
            Currency::Native { .. } => {
                let account = self.tracker.context().await.account?;
                self.native_balances().await.remove(&account)
            }
        }
    }

    pub async fn max_input_amount(&self) -> Option<CurrencyAmount> {
        max_amount_spend(self.input_balance().await.as_ref())
    }

    pub async fn derived_input(&self) -> ParsedInput {
        let balance = self.input_balance().await;
        self.store.with_state(|s| {
            derive_input(
                &s.position.input_value,
                s.position.input_currency.as_ref(),
                balance.as_ref(),
            )
        })
    }

    pub async fn on_percentage_input(&self, pct: u64) -> Option<String> {
        let max = self.max_input_amount().await;
        self.handlers.on_percentage_input(max.as_ref(), pct)
    }

    pub async fn on_max_input(&self) -> Option<String> {
        let max = self.max_input_amount().await;
        self.handlers.on_max_input(max.as_ref())
    }

    pub async fn native_balances(&self) -> BalanceRecord {
        let context = self.tracker.context().await;
        let account = context.account.map(|a| checksum(&a));
        self.tracker
            .aggregator()
            .resolve_native_balances(context.chain_id, [account.as_deref()], None)
            .await
    }

    /// Validates the form and, if the collateral is not yet approved for the
    /// market, submits an unlimited approval and records it.
    pub async fn attempt_to_approve(&self) -> Result<ApprovalOutcome, BuildError> {
        let position = self.store.with_state(|s| s.position.clone());
        check_build_preconditions(&position)?;

        let parsed = self.derived_input().await;
        if let Some(e) = parsed.error {
            return Err(e.into());
        }
        let Some(amount) = parsed.parsed_amount else {
            return Err(BuildError::MissingInputSize);
        };

        let approver = self.approver.as_ref().ok_or(BuildError::NoSigner)?;
        let context = self.tracker.context().await;
        if context.account != Some(approver.owner()) {
            return Err(BuildError::SignerMismatch {
                signer: checksum(&approver.owner()),
            });
        }
        let chain_id = context.chain_id.unwrap_or_default();

        let allowance = approver
            .allowance()
            .await
            .map_err(|e| BuildError::Submission(e.to_string()))?;
        let now = chrono::Utc::now().timestamp_millis();
        let pending = self.store.with_state(|s| {
            s.transactions
                .has_pending_approval(chain_id, approver.token(), approver.spender(), now)
        });

        match approval_state(Some(&amount), Some(allowance), pending) {
            ApprovalState::Approved => return Ok(ApprovalOutcome::AlreadyApproved),
            ApprovalState::Pending => return Ok(ApprovalOutcome::AwaitingConfirmation),
            ApprovalState::NotApproved | ApprovalState::Unknown => {}
        }

        let hash = approver
            .approve(U256::MAX)
            .await
            .map_err(|e| BuildError::Submission(e.to_string()))?;
        tracing::info!("approval submitted: {:#x}", hash);

        self.store.dispatch(TransactionAction::Add {
            chain_id,
            hash,
            from: approver.owner(),
            approval: Some(ApprovalInfo {
                token_address: approver.token(),
                spender: approver.spender(),
            }),
            summary: Some(format!("Approve {}", amount.currency().symbol())),
            added_time: now,
        });
        Ok(ApprovalOutcome::Submitted(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balances::tests::FakeReader;
    use crate::multicall::CallState;
    use crate::position::{PositionSide, TxnSettings};
    use crate::store::AppState;
    use crate::tokens::{Currency, TokenIdentity};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const OVL: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn ovl() -> TokenIdentity {
        TokenIdentity::new(1, OVL, 18, "OVL")
    }

    fn owner() -> Address {
        Address::repeat_byte(0x42)
    }

    fn spender() -> Address {
        Address::repeat_byte(0x99)
    }

    struct FakeApprover {
        allowance: U256,
        approvals: Mutex<Vec<U256>>,
    }

    #[async_trait]
    impl ApprovalSubmitter for FakeApprover {
        fn token(&self) -> Address {
            ovl().parsed_address().unwrap()
        }
        fn spender(&self) -> Address {
            spender()
        }
        fn owner(&self) -> Address {
            owner()
        }
        async fn allowance(&self) -> Result<U256> {
            Ok(self.allowance)
        }
        async fn approve(&self, amount: U256) -> Result<H256> {
            self.approvals.lock().unwrap().push(amount);
            Ok(H256::repeat_byte(0xab))
        }
    }

    fn approver(allowance: U256) -> Arc<FakeApprover> {
        Arc::new(FakeApprover {
            allowance,
            approvals: Mutex::new(Vec::new()),
        })
    }

    /// Session with 100 OVL in the wallet, OVL selected as collateral.
    async fn session(approver: Option<Arc<dyn ApprovalSubmitter>>) -> Session<FakeReader> {
        let balance = U256::from(100) * U256::exp10(18);
        let reader = FakeReader::with(&[(ovl().parsed_address().unwrap(), CallState::Resolved(balance))]);
        let tracker = Arc::new(BalanceTracker::new(reader, 1));
        tracker
            .set_watch(
                WalletContext {
                    account: Some(owner()),
                    chain_id: Some(1),
                },
                vec![ovl()],
            )
            .await;
        tracker.refresh(1).await;

        let store = Store::new(AppState::default(), TxnSettings::default());
        let session = Session::new(store, tracker, approver);
        session.handlers().on_currency_selection(Currency::Token(ovl()));
        session
    }

    fn fill_form(session: &Session<FakeReader>, amount: &str) {
        session.handlers().on_amount_input(amount);
        session.handlers().on_position_side_input(PositionSide::Long);
        session.handlers().on_leverage_input(2);
    }

    #[tokio::test]
    async fn quick_input_uses_tracked_balance() {
        let session = session(None).await;
        assert_eq!(session.on_percentage_input(75).await.as_deref(), Some("75"));
        assert_eq!(session.store().state().position.input_value, "75");
        assert_eq!(session.on_max_input().await.as_deref(), Some("100"));
    }

    #[tokio::test]
    async fn native_input_keeps_a_gas_reserve() {
        let session = session(None).await;
        let two_eth = U256::from(2) * U256::exp10(18);
        session
            .tracker()
            .aggregator()
            .reader()
            .values
            .lock()
            .unwrap()
            .insert(owner(), CallState::Resolved(two_eth));
        session.handlers().on_currency_selection(Currency::Native { chain_id: 1 });

        assert_eq!(session.input_balance().await.unwrap().raw(), two_eth);
        assert_eq!(session.on_max_input().await.as_deref(), Some("1.99"));
        session.handlers().on_amount_input("2.5");
        assert_eq!(
            session.derived_input().await.error,
            Some(crate::error::InputError::InsufficientBalance)
        );
    }

    #[tokio::test]
    async fn derived_input_checks_tracked_balance() {
        let session = session(None).await;
        session.handlers().on_amount_input("200");
        assert_eq!(
            session.derived_input().await.error,
            Some(crate::error::InputError::InsufficientBalance)
        );
        session.handlers().on_amount_input("10");
        assert!(session.derived_input().await.parsed_amount.is_some());
    }

    #[tokio::test]
    async fn approval_requires_a_complete_form() {
        let session = session(Some(approver(U256::zero()))).await;
        let err = session.attempt_to_approve().await.unwrap_err();
        assert!(matches!(err, BuildError::MissingInputSize));

        session.handlers().on_amount_input("5");
        let err = session.attempt_to_approve().await.unwrap_err();
        assert!(matches!(err, BuildError::MissingPositionSide));
    }

    #[tokio::test]
    async fn approval_without_signer_fails() {
        let session = session(None).await;
        fill_form(&session, "5");
        assert!(matches!(session.attempt_to_approve().await, Err(BuildError::NoSigner)));
    }

    #[tokio::test]
    async fn missing_allowance_submits_and_records_an_approval() {
        let approver = approver(U256::zero());
        let session = session(Some(approver.clone())).await;
        fill_form(&session, "5");

        let outcome = session.attempt_to_approve().await.unwrap();
        assert_eq!(outcome, ApprovalOutcome::Submitted(H256::repeat_byte(0xab)));
        assert_eq!(*approver.approvals.lock().unwrap(), vec![U256::MAX]);

        let pending = session.store().state().transactions.pending(1);
        assert_eq!(pending, vec![H256::repeat_byte(0xab)]);

        // A second attempt waits for the pending approval instead of re-sending.
        let outcome = session.attempt_to_approve().await.unwrap();
        assert_eq!(outcome, ApprovalOutcome::AwaitingConfirmation);
        assert_eq!(approver.approvals.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sufficient_allowance_skips_the_transaction() {
        let approver = approver(U256::MAX);
        let session = session(Some(approver.clone())).await;
        fill_form(&session, "5");
        assert_eq!(session.attempt_to_approve().await.unwrap(), ApprovalOutcome::AlreadyApproved);
        assert!(approver.approvals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn switching_account_blocks_approval_from_other_signer() {
        let session = session(Some(approver(U256::zero()))).await;
        fill_form(&session, "5");
        assert!(session.switch_account(Some(Address::repeat_byte(0x01))).await);
        assert!(matches!(
            session.attempt_to_approve().await,
            Err(BuildError::SignerMismatch { .. })
        ));
    }
}
