use rocket::FromForm;

use super::*;

#[derive(FromForm)]
pub struct ProxyCallback {
    #[field(name = "pgtIou")]
    pgt_iou: Option<String>,
    #[field(name = "pgtId")]
    pgt_id: Option<String>,
}

/// CAS delivers PGT/PGTIOU pairs here over its own HTTPS connection. A bare
/// request (CAS checking the URL is reachable) is answered with 400.
#[get("/casproxycallback?<callback..>")]
pub fn proxy_callback(state: &State<CasState>, callback: ProxyCallback) -> Result<&'static str, WebError> {
    state
        .client
        .record_proxy_callback(callback.pgt_iou.as_deref(), callback.pgt_id.as_deref())?;
    Ok("OK")
}
