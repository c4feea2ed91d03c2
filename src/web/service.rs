use rocket::form::Form;
use rocket::tokio::task::spawn_blocking;
use rocket::FromForm;
use tracing::info;

use super::*;

/// Where CAS sends the browser back with a service ticket.
#[get("/casservice?<ticket>&<returnto>")]
pub async fn service(
    state: &State<CasState>,
    ticket: Option<String>,
    returnto: Option<String>,
) -> Result<Redirect, WebError> {
    let next = local_path(returnto.as_deref());

    // Gateway logins come back without a ticket when the user has no CAS
    // session.
    let Some(ticket) = ticket else {
        return Ok(Redirect::to(next));
    };

    let mut params = ServiceParameters::new();
    params.set("returnto", returnto);
    let session_id = SessionRegistry::new_session_id();

    let client = Arc::clone(&state.client);
    let login = {
        let session_id = session_id.clone();
        spawn_blocking(move || client.complete_login(&ticket, &params, &session_id))
            .await
            .map_err(|e| WebError::Internal(e.to_string()))??
    };

    let username = login.identity.username.clone();
    for expired in state.sessions.open(&session_id, login.identity) {
        state.client.release_session(&expired);
    }
    let token = issue_token(state, &session_id, &username)?;
    info!(user = %username, "signed in");

    Ok(Redirect::to(next).with_cookie(state.web.session_cookie(&token)))
}

#[derive(FromForm)]
pub struct LogoutNotification {
    #[field(name = "logoutRequest")]
    logout_request: Option<String>,
}

/// CAS single logout. Unknown tickets are acknowledged like known ones.
#[post("/casservice", data = "<notification>")]
pub fn single_logout(state: &State<CasState>, notification: Form<LogoutNotification>) -> Result<&'static str, WebError> {
    let logout_request = notification
        .into_inner()
        .logout_request
        .ok_or_else(|| CasError::InvalidLogoutRequest("missing logoutRequest parameter".into()))?;

    state.client.handle_logout(&logout_request, state.sessions.as_ref())?;
    Ok("OK")
}
