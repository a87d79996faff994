use http::Uri;

/// Joins the upstream base uri with the path and query of an inbound request.
///
/// The base keeps its scheme, authority and path prefix; the inbound request
/// contributes everything after it.
///
/// # Examples
///
/// ```
/// use http::Uri;
/// use tunnel_proxy_core::utils::join_upstream_uri;
///
/// let base = "https://abc.a.pinggy.link/api".parse::<Uri>().unwrap();
/// let inbound = "/users?page=1".parse::<Uri>().unwrap();
/// let joined = join_upstream_uri(&base, &inbound).unwrap();
/// assert_eq!(joined.to_string(), "https://abc.a.pinggy.link/api/users?page=1");
/// ```
pub fn join_upstream_uri(base: &Uri, inbound: &Uri) -> Result<Uri, http::Error> {
    let base_path = base.path().trim_end_matches('/');
    let inbound_path = inbound.path().trim_start_matches('/');

    let mut path_and_query = format!("{}/{}", base_path, inbound_path);
    if let Some(query) = inbound.query().filter(|q| !q.is_empty()) {
        path_and_query.push('?');
        path_and_query.push_str(query);
    }

    let mut parts = base.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse()?);
    Ok(Uri::from_parts(parts)?)
}
