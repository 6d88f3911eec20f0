//! Scripted fake [`GatewayClient`] for worker tests that need to exercise
//! decision tables without a live Gateway. Each leg has its own queue of
//! canned responses, drained in call order; an exhausted queue panics —
//! tests should script exactly as many calls as they expect.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::payload::{GatewayResponse, LegRequest, NecRequest, TsqRequest};
use super::GatewayClient;
use crate::error::Result;

#[derive(Default)]
pub struct ScriptedGatewayClient {
    nec: Mutex<Vec<GatewayResponse>>,
    ftd: Mutex<Vec<GatewayResponse>>,
    ftc: Mutex<Vec<GatewayResponse>>,
    reversal: Mutex<Vec<GatewayResponse>>,
    tsq: Mutex<Vec<GatewayResponse>>,
}

/// Builds a canned response with just the fields worker decision tables
/// inspect; callers needing the raw body can construct `GatewayResponse`
/// directly instead.
pub fn response(action_code: Option<&str>, status_code: Option<&str>) -> GatewayResponse {
    GatewayResponse {
        action_code: action_code.map(str::to_string),
        status_code: status_code.map(str::to_string),
        approval_code: None,
        payee_name: None,
        raw_response: serde_json::json!({
            "actionCode": action_code,
            "statusCode": status_code,
        }),
        duration_ms: 1,
    }
}

impl ScriptedGatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_nec(&mut self, r: GatewayResponse) -> &mut Self {
        self.nec.get_mut().push(r);
        self
    }
    pub fn push_ftd(&mut self, r: GatewayResponse) -> &mut Self {
        self.ftd.get_mut().push(r);
        self
    }
    pub fn push_ftc(&mut self, r: GatewayResponse) -> &mut Self {
        self.ftc.get_mut().push(r);
        self
    }
    pub fn push_reversal(&mut self, r: GatewayResponse) -> &mut Self {
        self.reversal.get_mut().push(r);
        self
    }
    pub fn push_tsq(&mut self, r: GatewayResponse) -> &mut Self {
        self.tsq.get_mut().push(r);
        self
    }

    async fn take(queue: &Mutex<Vec<GatewayResponse>>) -> GatewayResponse {
        let mut guard = queue.lock().await;
        if guard.is_empty() {
            panic!("ScriptedGatewayClient: queue exhausted — test scripted too few responses");
        }
        guard.remove(0)
    }
}

#[async_trait]
impl GatewayClient for ScriptedGatewayClient {
    async fn name_enquiry(&self, _req: NecRequest) -> Result<GatewayResponse> {
        Ok(Self::take(&self.nec).await)
    }

    async fn ftd(&self, _req: LegRequest) -> Result<GatewayResponse> {
        Ok(Self::take(&self.ftd).await)
    }

    async fn ftc(&self, _req: LegRequest) -> Result<GatewayResponse> {
        Ok(Self::take(&self.ftc).await)
    }

    async fn reversal(&self, _req: LegRequest) -> Result<GatewayResponse> {
        Ok(Self::take(&self.reversal).await)
    }

    async fn tsq(&self, _req: TsqRequest) -> Result<GatewayResponse> {
        Ok(Self::take(&self.tsq).await)
    }
}
