use anyhow::Result;
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    signers::{LocalWallet, Signer},
};
use position_builder::{
    approval::{ApprovalSubmitter, Erc20Approver},
    balances::WalletContext,
    commands::{self, Command},
    config::Config,
    database::Database,
    multicall::EthersBatchReader,
    persistence,
    session::Session,
    store::{AppAction, AppState, Store},
    tokens::{Currency, TokenIdentity, TokenRegistry},
    tracker::BalanceTracker,
    updater,
};
use std::{str::FromStr, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn load_registry(config: &Config, chain_id: u64) -> Result<TokenRegistry> {
    let mut registry = match &config.token_list_path {
        Some(path) => TokenRegistry::from_file(path)?,
        None => TokenRegistry::default(),
    };
    if let Some(address) = &config.ovl_token_address {
        registry.insert(TokenIdentity::new(chain_id, address.clone(), 18, "OVL"));
    }
    Ok(registry)
}

async fn run_terminal(session: Session<EthersBatchReader<Provider<Http>>>) -> Result<()> {
    println!("{}", commands::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        println!("{}", commands::execute(&session, command).await);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "position_builder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // 1. Load configuration
    let config = Arc::new(Config::from_env()?);
    tracing::info!("✅ Configuration loaded.");

    // 2. Restore persisted state
    let db = Arc::new(Database::new(&config.db_path)?);
    tracing::info!("✅ Database opened at: {}", &config.db_path);
    let persisted = persistence::load_persisted(db.as_ref());
    let store = Store::new(
        AppState::preloaded(persisted.user, persisted.transactions, &config.txn_defaults),
        config.txn_defaults.clone(),
    );
    store.dispatch(AppAction::UpdateVersion {
        timestamp: chrono::Utc::now().timestamp_millis(),
    });
    let saver_handle = persistence::spawn_saver(&store, db.clone(), config.persist_debounce);

    // 3. Initialize Ethereum provider
    let provider = Provider::<Http>::try_from(config.rpc_url.as_str())?;
    let chain_id = provider.get_chainid().await?.as_u64();
    tracing::info!("✅ Ethereum provider connected (chain {}).", chain_id);
    let client = Arc::new(provider.clone());

    let wallet = match &config.private_key {
        Some(key) => Some(LocalWallet::from_str(key)?.with_chain_id(chain_id)),
        None => None,
    };
    let account = config.account.or_else(|| wallet.as_ref().map(|w| w.address()));

    // 4. Collateral token
    let registry = load_registry(&config, chain_id)?;
    let ovl = registry.ovl(chain_id).cloned();
    match &ovl {
        Some(token) => tracing::info!("-> Collateral: {} at {}", token.symbol, token.address),
        None => tracing::warn!("no OVL token configured for chain {}", chain_id),
    }

    let approver: Option<Arc<dyn ApprovalSubmitter>> = match (&wallet, &ovl, config.market_address) {
        (Some(wallet), Some(token), Some(market)) => match token.parsed_address() {
            Some(token_address) => {
                let signer = Arc::new(SignerMiddleware::new(provider.clone(), wallet.clone()));
                tracing::info!("-> Signer: {:#x}", wallet.address());
                let approver: Arc<dyn ApprovalSubmitter> =
                    Arc::new(Erc20Approver::new(signer, token_address, market, wallet.address()));
                Some(approver)
            }
            None => None,
        },
        _ => {
            tracing::warn!("approvals disabled: PRIVATE_KEY, OVL token and MARKET_ADDRESS are all required");
            None
        }
    };

    // 5. Balance tracking
    let reader = EthersBatchReader::new(Arc::clone(&client), config.multicall_address);
    let tracker = Arc::new(BalanceTracker::new(reader, config.blocks_per_fetch));
    tracker
        .set_watch(
            WalletContext {
                account,
                chain_id: Some(chain_id),
            },
            ovl.iter().cloned().collect(),
        )
        .await;
    if let Some(token) = ovl {
        store.dispatch(position_builder::position::PositionAction::SelectInputCurrency(
            Currency::Token(token),
        ));
    }

    // 6. Start the updater and the terminal concurrently
    tracing::info!("🚀 Starting updater and terminal...");
    let mut updater_handle = tokio::spawn(updater::run_updater(
        Arc::clone(&client),
        store.clone(),
        Arc::clone(&tracker),
        chain_id,
        config.poll_interval,
    ));
    let session = Session::new(store, tracker, approver);

    let result = tokio::select! {
        result = &mut updater_handle => {
            tracing::error!("[FATAL] Updater has exited.");
            result.map_err(anyhow::Error::from).and_then(|r| r)
        }
        result = run_terminal(session) => result,
    };

    // The session is gone; stopping the updater releases the last store
    // handle so the saver writes any pending change and exits.
    let updater = (!updater_handle.is_finished()).then_some(updater_handle);
    persistence::flush_on_shutdown(updater, saver_handle).await?;
    tracing::info!("✅ State saved.");
    result
}
