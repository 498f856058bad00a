mod api;
mod blockchain;
mod cli;
mod config;
mod consensus;
mod crypto;
mod external;
mod genesis;
mod primitives;
mod slashing;
mod staking;
mod types;
mod validator_set;
mod wire;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use env_logger::Builder;
use log::{info, warn, LevelFilter};
use tokio::sync::RwLock;
use tokio::time::Duration;

use api::{configure_routes, AppState};
use cli::{Cli, Command};
use config::NodeConfig;
use consensus::{ConsensusConfig, ConsensusEngine};
use crypto::KeyPair;
use external::{InMemoryKeystore, Keystore, NullTransactionPool};
use genesis::Genesis;
use slashing::Slasher;
use staking::StakingManager;
use types::ValidatorMetadata;
use validator_set::ValidatorSet;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    Builder::new().filter_level(LevelFilter::Info).format_timestamp_secs().init();

    info!("===========================================");
    info!("   PIXELZX proof-of-stake node");
    info!("===========================================");

    let cli = Cli::parse();
    match cli.command {
        Command::Init { data_dir } => run_init(&data_dir),
        Command::Start { data_dir, validator } => run_start(&data_dir, validator).await,
    }
}

fn run_init(data_dir: &str) -> std::io::Result<()> {
    let dir = Path::new(data_dir);
    fs::create_dir_all(dir)?;
    fs::create_dir_all(dir.join("keystore"))?;
    fs::create_dir_all(dir.join("logs"))?;

    let config_path = dir.join("config.yaml");
    if config_path.exists() {
        info!("config.yaml already present at {}, leaving it untouched", config_path.display());
    } else {
        config::NodeConfig::write_default(&config_path).map_err(to_io_error)?;
        info!("wrote default config to {}", config_path.display());
    }

    let genesis_path = dir.join("genesis.json");
    if genesis_path.exists() {
        info!("genesis.json already present at {}, leaving it untouched", genesis_path.display());
    } else {
        fs::write(&genesis_path, default_genesis_json())?;
        info!("wrote default genesis to {}", genesis_path.display());
    }

    Ok(())
}

async fn run_start(data_dir: &str, validator_keyfile: Option<String>) -> std::io::Result<()> {
    let dir = PathBuf::from(data_dir);
    let config = NodeConfig::load(&dir.join("config.yaml")).map_err(to_io_error)?;
    let genesis = Genesis::load(&dir.join("genesis.json")).map_err(to_io_error)?;

    let staking_config = genesis.staking_config().map_err(to_io_error)?;
    let slasher_config = genesis.slasher_config().map_err(to_io_error)?;
    let genesis_validators = genesis.validators().map_err(to_io_error)?;
    let block_reward = staking_config.block_reward.clone();

    let mut staking = StakingManager::new(staking_config);
    let mut validator_set = ValidatorSet::new(125);
    for (address, pubkey, power) in genesis_validators {
        if staking
            .register_validator(address, pubkey.clone(), power.clone(), 0, ValidatorMetadata::default())
            .is_err()
        {
            warn!("skipping duplicate genesis validator {address:?}");
            continue;
        }
        if let Some(v) = staking.get_validator(&address) {
            validator_set.add(v);
        }
    }
    let slasher = Arc::new(RwLock::new(Slasher::new(slasher_config)));

    let keyfile = validator_keyfile.or(config.validator_keyfile.clone());
    let keystore: Arc<dyn Keystore> = match keyfile {
        Some(path) => {
            let secret = fs::read(&path)?;
            let key = KeyPair::from_bytes(&secret).map_err(to_io_error)?;
            info!("loaded validator key for {:?} from {path}", key.address());
            Arc::new(InMemoryKeystore::new(Some(key)))
        }
        None => {
            info!("no validator key configured; running as a read-only node");
            Arc::new(InMemoryKeystore::empty())
        }
    };

    let validator_set = Arc::new(RwLock::new(validator_set));
    let staking = Arc::new(RwLock::new(staking));

    let engine = Arc::new(ConsensusEngine::new(
        ConsensusConfig {
            chain_id: genesis.chain_id,
            block_time: Duration::from_secs(genesis.config.pos.period.max(1)),
            epoch_length: genesis.config.pos.epoch.max(1),
            block_reward,
        },
        Arc::clone(&validator_set),
        Arc::clone(&staking),
        slasher,
        keystore,
        Arc::new(NullTransactionPool),
    ));
    engine.start().await.map_err(to_io_error)?;
    info!("consensus engine started at chain_id={}", engine.chain_id());

    let app_state = web::Data::new(AppState {
        chain_id: genesis.chain_id,
        network_id: config.network_id,
        validator_set,
        staking,
        engine,
    });

    info!("starting status API at http://{}", config.api_addr);
    HttpServer::new(move || {
        let cors = Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600);
        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(configure_routes)
    })
    .bind(&config.api_addr)?
    .run()
    .await
}

fn to_io_error<E: std::fmt::Display>(err: E) -> std::io::Error {
    std::io::Error::other(err.to_string())
}

fn default_genesis_json() -> String {
    r#"{
  "chainId": 1337,
  "timestamp": 1700000000,
  "difficulty": "0x1",
  "gasLimit": "0x1c9c380",
  "alloc": {},
  "config": {
    "chainId": 1337,
    "pos": {
      "period": 5,
      "epoch": 100,
      "minValidatorStake": "1000000000000000000",
      "minDelegatorStake": "1000000000000000",
      "maxValidators": 125,
      "unbondingPeriod": 1814400,
      "slashingPenalty": "10000000000000000",
      "blockReward": "2000000000000000000"
    }
  },
  "extraData": "pixelzx",
  "validators": []
}
"#
    .to_string()
}
