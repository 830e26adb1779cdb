use serde::{
    Deserialize,
    Serialize,
};

/// Page requested from the upstream on every refresh.
pub const DEFAULT_PAGE: u32 = 1;

/// Items per page requested from the upstream. Only the first page is ever fetched.
pub const DEFAULT_PER_PAGE: u32 = 1000;

///The body of a subscribe request.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DomainList {
    pub domains: Vec<String>,
}

///The body sent to the upstream transactions endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TxsRequest {
    pub txs: DomainFilter,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DomainFilter {
    pub domain: Vec<String>,
}

impl TxsRequest {
    pub fn for_domains(domains: &[String]) -> Self {
        Self {
            txs: DomainFilter {
                domain: domains.to_vec(),
            },
        }
    }
}

///The error payload the upstream returns with non-2xx responses.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct UpstreamErrorResponse {
    pub errors: Vec<UpstreamErrorEntry>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct UpstreamErrorEntry {
    pub code: Option<String>,
    pub message: Option<String>,
    pub field: Option<String>,
    pub value: Option<String>,
    pub status: Option<i64>,
}

impl UpstreamErrorResponse {
    /// Renders every entry as `code / message` and joins them with a space.
    pub fn joined_message(&self) -> String {
        self.errors
            .iter()
            .map(|entry| {
                format!(
                    "{} / {}",
                    entry.code.as_deref().unwrap_or_default(),
                    entry.message.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_txs_request_shape() {
        let request = TxsRequest::for_domains(&["alice.crypto".to_string(), "bob.x".to_string()]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({ "txs": { "domain": ["alice.crypto", "bob.x"] } })
        );
    }

    #[test]
    fn test_joined_message_handles_missing_parts() {
        let response: UpstreamErrorResponse = serde_json::from_value(json!({
            "errors": [
                { "code": "E_DOMAIN", "message": "unknown domain", "field": "domain" },
                { "message": "try later", "status": 500 }
            ]
        }))
        .unwrap();

        assert_eq!(
            response.joined_message(),
            "E_DOMAIN / unknown domain  / try later"
        );
    }

    #[test]
    fn test_domain_list_rejects_missing_field() {
        let parsed: Result<DomainList, _> = serde_json::from_value(json!({ "names": [] }));
        assert!(parsed.is_err());
    }
}
