use super::*;

/// Sends the browser to CAS. `returnto` travels inside the service URL so
/// it survives the round trip.
#[get("/login?<returnto>&<gateway>")]
pub fn login(state: &State<CasState>, returnto: Option<String>, gateway: Option<bool>) -> Result<Redirect, WebError> {
    let mut params = ServiceParameters::new();
    params.set("returnto", returnto);
    let location = state.client.login_url(&params, gateway.unwrap_or(false))?;
    Ok(Redirect::to(location))
}
