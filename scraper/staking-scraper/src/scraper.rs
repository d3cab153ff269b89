//! Defines the scraper struct, a dependency injection container which stores
//! handles to shared resources and spawns the scan loops

use std::{sync::Arc, time::Duration};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    aggregator::EventAggregator,
    chain_reader::{ChainReader, ReaderConfig},
    checkpoint::CheckpointStore,
    cli::Cli,
    db::{client::DbClient, interface::token_prices::TokenPriceReader},
    endpoint_pool::EndpointPool,
    error::ScraperError,
    parachain::{ParachainClient, ParachainConnector},
    publisher::Publisher,
    relay_chain::{RelayChainClient, RelayChainConnector, ss58::ss58_decode},
    scanner::{BlockScanner, ScanTarget, ScannerConfig, error::ScanError},
    targets::{
        events::EventsTarget,
        parachain_state::{ParachainStateTarget, TokenPriceSource},
        relay_state::{PayoutAccount, RelayStateTarget},
        validators_info::ValidatorsInfoTarget,
    },
    types::{ChainId, ProtocolConstants},
};

/// The first backoff after a failed window
const BASE_BACKOFF: Duration = Duration::from_secs(1);
/// The number of scan loops, each holding at most one store connection
const SCAN_LOOPS: u32 = 4;
/// The connection pool size of the token price collector
const PRICE_POOL_SIZE: u32 = 1;

/// The result of a scan loop task
pub type LoopResult = Result<(), ScanError>;

/// The scraper struct. Stores handles to shared resources.
#[derive(Clone)]
pub struct Scraper {
    /// The checkpoint store
    pub db: DbClient,
    /// The gauge registry shared by every loop
    pub publisher: Arc<Publisher>,
    /// The parachain reader
    pub parachain: Arc<ChainReader<ParachainClient>>,
    /// The relay chain reader
    pub relay: Arc<ChainReader<RelayChainClient>>,
    /// The token price source, if configured
    pub prices: Option<Arc<dyn TokenPriceSource>>,
    /// The protocol constants
    pub constants: ProtocolConstants,
    /// The payout service account, if configured
    pub payout: Option<PayoutAccount>,
    /// Tunables shared by every scan loop
    pub scanner_config: ScannerConfig,
    /// The CLI arguments the scraper was built from
    cli: Arc<Cli>,
}

impl Scraper {
    /// Build a scraper from the provided CLI arguments
    pub async fn build_from_cli(cli: &Cli) -> Result<Self, ScraperError> {
        cli.validate()?;
        let publisher = Arc::new(Publisher::new(cli.prometheus_metrics_prefix.clone()));

        // Set up the chain readers
        let reader_config = ReaderConfig {
            call_timeout: cli.call_timeout(),
            max_attempts: None,
            max_range: cli.max_range_of_blocks,
        };

        let para_pool = EndpointPool::new(ChainId::Parachain, &cli.ws_urls_para, cli.call_timeout())?
            .with_publisher(publisher.clone());
        let parachain = Arc::new(ChainReader::new(
            Arc::new(para_pool),
            Arc::new(ParachainConnector::new(cli.contract_addresses())),
            reader_config,
        ));

        let relay_pool = EndpointPool::new(ChainId::RelayChain, &cli.ws_urls_relay, cli.call_timeout())?
            .with_publisher(publisher.clone());
        let relay =
            Arc::new(ChainReader::new(Arc::new(relay_pool), Arc::new(RelayChainConnector), reader_config));

        // Set up the database client
        let db = DbClient::new(&cli.database_url, SCAN_LOOPS + 1).await?;
        db.run_migrations().await?;

        let prices = match &cli.database_url_token_price_collector {
            Some(url) => {
                let price_db = DbClient::new(url, PRICE_POOL_SIZE).await?;
                let reader = TokenPriceReader::new(price_db, &cli.token_symbol)?;
                Some(Arc::new(reader) as Arc<dyn TokenPriceSource>)
            },
            None => {
                info!("no token price collector configured, skipping usd metrics");
                None
            },
        };

        let payout = cli
            .payout_service_address
            .as_deref()
            .map(|address| parse_payout_account(address, cli.ss58_format_relay))
            .transpose()?;
        if let Some(account) = &payout {
            info!(address = %account.address, "tracking payout service balance");
        }

        let scanner_config = ScannerConfig {
            max_range: cli.max_range_of_blocks,
            poll_interval: Duration::from_millis(cli.poll_interval_ms),
            base_backoff: BASE_BACKOFF,
            max_backoff: Duration::from_secs(cli.max_backoff_secs).max(BASE_BACKOFF),
        };

        Ok(Self {
            db,
            publisher,
            parachain,
            relay,
            prices,
            constants: cli.protocol_constants(),
            payout,
            scanner_config,
            cli: Arc::new(cli.clone()),
        })
    }

    /// Spawn every scan loop into the given task set
    pub fn spawn_loops(&self, tasks: &mut JoinSet<LoopResult>, cancel: &CancellationToken) {
        let store: Arc<dyn CheckpointStore> = Arc::new(self.db.clone());
        let history_limit = self.cli.database_query_limit;

        let events = EventsTarget::new(
            self.parachain.clone(),
            EventAggregator::new(&self.constants, history_limit),
            store.clone(),
            self.cli.initial_block_number,
        );
        self.spawn_loop(tasks, events, cancel);

        let parachain_state = ParachainStateTarget::new(
            self.parachain.clone(),
            EventAggregator::new(&self.constants, history_limit),
            self.prices.clone(),
        );
        self.spawn_loop(tasks, parachain_state, cancel);

        let relay_state = RelayStateTarget::new(
            self.relay.clone(),
            self.parachain.clone(),
            store,
            self.constants,
            self.payout.clone(),
            self.cli.ss58_format_relay,
        );
        self.spawn_loop(tasks, relay_state, cancel);

        let validators_info = ValidatorsInfoTarget::new(
            self.relay.clone(),
            self.parachain.clone(),
            self.cli.ss58_format_relay,
            Duration::from_secs(self.cli.validators_info_waiting_time),
        );
        self.spawn_loop(tasks, validators_info, cancel);
    }

    /// Spawn the scan loop of one target
    fn spawn_loop<T: ScanTarget + 'static>(
        &self,
        tasks: &mut JoinSet<LoopResult>,
        target: T,
        cancel: &CancellationToken,
    ) {
        let store = self.db.clone();
        tasks.spawn(run_loop(target, store, self.publisher.clone(), self.scanner_config, cancel.clone()));
    }
}

/// Build the scanner of a target and run it until cancelled
async fn run_loop<T: ScanTarget>(
    target: T,
    store: DbClient,
    publisher: Arc<Publisher>,
    config: ScannerConfig,
    cancel: CancellationToken,
) -> LoopResult {
    let scanner = BlockScanner::new(target, store, publisher, config).await?;
    scanner.run(cancel).await;
    Ok(())
}

/// Parse the payout service address, warning on a foreign address format
fn parse_payout_account(address: &str, ss58_format: u16) -> Result<PayoutAccount, ScraperError> {
    let (account, format) = ss58_decode(address)?;
    if format != ss58_format {
        warn!(format, expected = ss58_format, "payout service address uses a foreign format");
    }

    Ok(PayoutAccount { account, address: address.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay_chain::ss58::ss58_encode;

    #[test]
    fn test_parse_payout_account() {
        let address = ss58_encode(&[7u8; 32], 2);
        let account = parse_payout_account(&address, 2).unwrap();
        assert_eq!(account.account, [7u8; 32]);
        assert_eq!(account.address, address);
    }

    #[test]
    fn test_parse_payout_account_rejects_garbage() {
        assert!(matches!(parse_payout_account("not-an-address", 2), Err(ScraperError::Address(_))));
    }
}
