use tracing::info;

use super::*;

/// Ends the local session, then hands the browser to CAS so the single
/// sign-on session ends too.
#[get("/logout")]
pub fn logout(state: &State<CasState>, cookies: &CookieJar<'_>) -> Result<Redirect, WebError> {
    if let Ok((claims, _)) = authenticate(state, cookies) {
        state.client.end_session(&claims.sid);
        state.sessions.close(&claims.sid);
        info!(user = %claims.sub, "signed out");
    }

    let location = state.client.logout_url()?;
    Ok(Redirect::to(location).with_cookie(state.web.removal_cookie()))
}
