use rocket::tokio::task::spawn_blocking;
use serde::Serialize;

use super::*;

pub struct Json<T>(T);

impl<'r, 'o: 'r, T: Serialize> Responder<'r, 'o> for Json<T> {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let body = serde_json::to_string(&self.0).map_err(|_| Status::InternalServerError)?;
        Ok(Response::build()
            .status(Status::Ok)
            .header(Header::new("Content-Type", "application/json"))
            .sized_body(body.len(), Cursor::new(body))
            .finalize())
    }
}

#[get("/api/identity")]
pub fn identity(state: &State<CasState>, cookies: &CookieJar<'_>) -> Result<Json<LiveSession>, WebError> {
    authenticate(state, cookies).map(|(_, session)| Json(session))
}

/// Opens (or reuses) a proxied session on `target` for the signed-in user.
#[get("/api/proxy?<target>")]
pub async fn proxy(
    state: &State<CasState>,
    cookies: &CookieJar<'_>,
    target: String,
) -> Result<Json<crate::ProxySession>, WebError> {
    let (claims, _) = authenticate(state, cookies)?;
    let client = Arc::clone(&state.client);
    let session = spawn_blocking(move || client.proxy_authenticate(&target, &claims.sid))
        .await
        .map_err(|e| WebError::Internal(e.to_string()))??;
    Ok(Json(session))
}
