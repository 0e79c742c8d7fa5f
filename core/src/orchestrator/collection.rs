//! Body of one collection run
//!
//! Full path (platform attestation and device check both supported):
//! handshake, evidence and device token run concurrently, then evidence is
//! submitted, then the attestation pipeline runs. Reduced path: the same
//! without token and attestation. When native evidence is already accepted
//! for this session the run only re-binds and re-attests.

use super::task::TaskOutcome;
use crate::attestation::{AttestationPipeline, DeviceTokenProvider};
use crate::environment::Environment;
use crate::error::VerisoulError;
use crate::evidence::{tag_with_sdk_info, EvidenceCollector, SdkInfo};
use crate::handshake::SessionHandshake;
use crate::network::TrustApiClient;
use crate::session::{SessionRegistry, StatusFlag};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything a run needs, captured when the run is started
#[derive(Clone)]
pub struct CollectionContext {
    pub generation: u64,
    pub session_id: String,
    pub env: Environment,
    pub project_id: String,
    pub registry: Arc<SessionRegistry>,
    pub api: Arc<TrustApiClient>,
    pub pipeline: Arc<AttestationPipeline>,
    pub evidence: Arc<dyn EvidenceCollector>,
    pub device_tokens: Arc<DeviceTokenProvider>,
    pub handshake: Arc<dyn SessionHandshake>,
    pub sdk_info: SdkInfo,
    /// Upper bound on the handshake
    pub handshake_timeout: Duration,
}

impl CollectionContext {
    fn full_path_supported(&self) -> bool {
        self.pipeline.is_supported() && self.device_tokens.is_supported()
    }
}

fn cancelled(ctx: &CollectionContext, token: &CancellationToken, stage: &str) -> bool {
    if token.is_cancelled() {
        info!(
            "[Collection] Generation {} cancelled before {}",
            ctx.generation, stage
        );
        return true;
    }
    false
}

pub async fn run_collection(ctx: CollectionContext, token: CancellationToken) -> TaskOutcome {
    if cancelled(&ctx, &token, "start") {
        return TaskOutcome::Cancelled;
    }
    let full = ctx.full_path_supported();
    info!(
        "[Collection] Generation {} started for session {} ({} path)",
        ctx.generation,
        ctx.session_id,
        if full { "full" } else { "reduced" }
    );

    if !ctx.registry.needs_submit(StatusFlag::NativeDataCollection) {
        info!("[Collection] Native evidence already accepted, re-binding only");
        if full {
            ctx.pipeline.set_session_id(&ctx.session_id).await;
            if cancelled(&ctx, &token, "attestation") {
                return TaskOutcome::Cancelled;
            }
            attest(&ctx).await;
        }
        return TaskOutcome::Completed;
    }

    let handshake = async {
        match tokio::time::timeout(
            ctx.handshake_timeout,
            ctx.handshake
                .start_session(ctx.env, &ctx.project_id, &ctx.session_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(VerisoulError::session_unavailable("WebView initialization timed out")),
        }
    };
    let device_token = async {
        if full {
            ctx.device_tokens.token().await
        } else {
            None
        }
    };
    let (bound, mut evidence, device_token) =
        tokio::join!(handshake, ctx.evidence.collect(), device_token);

    if let Err(e) = bound {
        error!("[Collection] Session handshake failed: {}", e);
        return TaskOutcome::handshake_failed(e);
    }
    if cancelled(&ctx, &token, "evidence submission") {
        return TaskOutcome::Cancelled;
    }

    if full {
        ctx.pipeline.set_session_id(&ctx.session_id).await;
    }

    tag_with_sdk_info(&mut evidence, &ctx.sdk_info);
    let device_check = device_token
        .map(|token| BASE64.encode(token))
        .unwrap_or_default();
    match ctx
        .api
        .post_device_data(
            &ctx.session_id,
            &Value::Object(evidence),
            &device_check,
            &ctx.project_id,
        )
        .await
    {
        Some(true) => {
            ctx.registry.mark_done(StatusFlag::NativeDataCollection);
            info!("[Collection] Device evidence accepted");
        }
        Some(false) => warn!("[Collection] Device evidence not acknowledged"),
        None => {
            warn!("[Collection] Device evidence could not be submitted");
            return TaskOutcome::Completed;
        }
    }

    if !full {
        return TaskOutcome::Completed;
    }
    if cancelled(&ctx, &token, "attestation") {
        return TaskOutcome::Cancelled;
    }
    attest(&ctx).await;
    TaskOutcome::Completed
}

async fn attest(ctx: &CollectionContext) {
    if !ctx.registry.needs_submit(StatusFlag::DeviceCheck) {
        return;
    }
    if ctx.pipeline.attest_app(&ctx.project_id).await {
        ctx.registry.mark_done(StatusFlag::DeviceCheck);
        info!("[Collection] Attestation accepted");
    } else {
        warn!("[Collection] Attestation not accepted");
    }
}
