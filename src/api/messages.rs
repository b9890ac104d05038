pub const MAX_PAGE_SIZE: usize = 500;

pub fn message_endpoint(id: &str) -> String {
    format!("/gmail/v1/users/me/messages/{id}")
}

pub fn list_endpoint() -> &'static str {
    "/gmail/v1/users/me/messages"
}

pub fn batch_modify_endpoint() -> &'static str {
    "/gmail/v1/users/me/messages/batchModify"
}

pub fn metadata_query() -> Vec<(String, String)> {
    let mut query = vec![("format".to_string(), "metadata".to_string())];

    for header in ["From", "Subject", "Date"] {
        query.push(("metadataHeaders".to_string(), header.to_string()));
    }

    query
}

pub fn list_query(
    page_size: usize,
    query: Option<&str>,
    page_token: Option<&str>,
) -> Vec<(String, String)> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let mut params = vec![("maxResults".to_string(), page_size.to_string())];
    if let Some(query) = query.map(str::trim).filter(|query| !query.is_empty()) {
        params.push(("q".to_string(), query.to_string()));
    }
    if let Some(token) = page_token {
        params.push(("pageToken".to_string(), token.to_string()));
    }
    params
}
