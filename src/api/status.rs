//! `/api/status/*` read-only report endpoints.

use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::consensus::{ConsensusEngine, EngineState};
use crate::staking::StakingManager;
use crate::validator_set::ValidatorSet;

/// Shared handler state, one `Arc<RwLock<_>>` per component — the same
/// sharing pattern the reference binary's `AppState` uses for its
/// blockchain/consensus/marketplace fields.
pub struct AppState {
    pub chain_id: u64,
    pub network_id: u64,
    pub validator_set: Arc<RwLock<ValidatorSet>>,
    pub staking: Arc<RwLock<StakingManager>>,
    pub engine: Arc<ConsensusEngine>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse { success: true, data: Some(data), error: None }
    }

    pub fn error(msg: &str) -> Self {
        ApiResponse { success: false, data: None, error: Some(msg.to_string()) }
    }
}

#[derive(Debug, Serialize)]
pub struct NodeStatusView {
    pub chain_id: u64,
    pub network_id: u64,
    pub engine_state: String,
    pub epoch: u64,
}

#[derive(Debug, Serialize)]
pub struct NetworkStatusView {
    pub network_id: u64,
    pub chain_id: u64,
}

#[derive(Debug, Serialize)]
pub struct ValidatorView {
    pub address: String,
    pub voting_power: String,
    pub commission_bps: u16,
    pub jailed: bool,
    pub jailed_until: i64,
    pub moniker: String,
}

#[derive(Debug, Serialize)]
pub struct StakingView {
    pub total_voting_power: String,
    pub validator_count: usize,
}

pub async fn get_node_status(data: web::Data<AppState>) -> impl Responder {
    let state = data.engine.state().await;
    let view = NodeStatusView {
        chain_id: data.chain_id,
        network_id: data.network_id,
        engine_state: match state {
            EngineState::Idle => "idle".to_string(),
            EngineState::Validating => "validating".to_string(),
        },
        epoch: data.engine.epoch(),
    };
    HttpResponse::Ok().json(ApiResponse::success(view))
}

pub async fn get_network_status(data: web::Data<AppState>) -> impl Responder {
    let view = NetworkStatusView { network_id: data.network_id, chain_id: data.chain_id };
    HttpResponse::Ok().json(ApiResponse::success(view))
}

pub async fn get_validators(data: web::Data<AppState>) -> impl Responder {
    // The staking manager owns the full roster; the validator set only
    // exposes the active, sorted view used for proposer rotation.
    let staking = data.staking.read().await;
    let views: Vec<ValidatorView> = staking
        .all_validators()
        .into_iter()
        .map(|v| ValidatorView {
            address: format!("{:?}", v.address),
            voting_power: v.voting_power.to_string(),
            commission_bps: v.commission_bps,
            jailed: v.jailed,
            jailed_until: v.jailed_until,
            moniker: v.metadata.moniker,
        })
        .collect();
    HttpResponse::Ok().json(ApiResponse::success(views))
}

pub async fn get_staking_status(data: web::Data<AppState>) -> impl Responder {
    let set = data.validator_set.read().await;
    let view = StakingView { total_voting_power: set.total_voting_power().to_string(), validator_count: set.len() };
    HttpResponse::Ok().json(ApiResponse::success(view))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/status/node", web::get().to(get_node_status))
        .route("/api/status/network", web::get().to(get_network_status))
        .route("/api/status/validators", web::get().to(get_validators))
        .route("/api/status/staking", web::get().to(get_staking_status));
}
