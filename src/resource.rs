//! Resource addresses and their resolution against the cache.

use crate::cache::CacheStore;
use crate::dispatch::DispatchError;
use crate::search::SearchProvider;
use crate::types::{SearchDepth, SearchResult};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::{debug, info, warn};

pub const LAST_SEARCH_URI: &str = "tavily://last-search/result";
pub const SEARCH_URI_PREFIX: &str = "tavily://search/";
pub const SEARCH_URI_TEMPLATE: &str = "tavily://search/{query}";
pub const RESOURCE_MIME_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceAddress {
    LastSearch,
    Search { query: String },
}

impl ResourceAddress {
    /// Classifies a URI. `None` means the address is not one we serve.
    pub fn parse(uri: &str) -> Option<Self> {
        if uri == LAST_SEARCH_URI {
            return Some(Self::LastSearch);
        }

        let segment = uri.strip_prefix(SEARCH_URI_PREFIX)?;
        if segment.is_empty() || segment.contains('/') {
            return None;
        }

        let query = percent_decode_str(segment).decode_utf8().ok()?;
        if query.is_empty() {
            return None;
        }

        Some(Self::Search {
            query: query.into_owned(),
        })
    }
}

/// Builds the `tavily://search/...` address for a query.
pub fn search_uri(query: &str) -> String {
    format!(
        "{}{}",
        SEARCH_URI_PREFIX,
        utf8_percent_encode(query, NON_ALPHANUMERIC)
    )
}

/// Resolves `uri` to a search result, fetching and caching on a miss.
pub async fn resolve(
    uri: &str,
    cache: &CacheStore,
    provider: &dyn SearchProvider,
) -> Result<SearchResult, DispatchError> {
    let address =
        ResourceAddress::parse(uri).ok_or_else(|| DispatchError::UnrecognizedUri(uri.to_string()))?;

    match address {
        ResourceAddress::LastSearch => cache.get_last().await.ok_or(DispatchError::NoSearchYet),
        ResourceAddress::Search { query } => {
            if let Some(cached) = cache.get(&query).await {
                debug!("Resource cache hit for query: {}", query);
                return Ok(cached);
            }

            info!("Resource cache miss, searching for: {}", query);
            let result = provider
                .search(&query, SearchDepth::default())
                .await
                .map_err(|e| {
                    warn!("Resource search failed for {}: {}", query, e);
                    DispatchError::Upstream(e)
                })?;

            cache.put(&query, result.clone()).await?;
            Ok(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_last_search() {
        assert_eq!(
            ResourceAddress::parse("tavily://last-search/result"),
            Some(ResourceAddress::LastSearch)
        );
    }

    #[test]
    fn parses_and_decodes_search_template() {
        assert_eq!(
            ResourceAddress::parse("tavily://search/unknown%20query"),
            Some(ResourceAddress::Search {
                query: "unknown query".into()
            })
        );
        assert_eq!(
            ResourceAddress::parse("tavily://search/caf%C3%A9%20%2F%20bar%3F"),
            Some(ResourceAddress::Search {
                query: "café / bar?".into()
            })
        );
        assert_eq!(
            ResourceAddress::parse("tavily://search/plain"),
            Some(ResourceAddress::Search {
                query: "plain".into()
            })
        );
    }

    #[test]
    fn rejects_other_shapes() {
        for uri in [
            "",
            "tavily://last-search",
            "tavily://last-search/result/extra",
            "tavily://search/",
            "tavily://search/a/b",
            "tavily://search/%FF",
            "http://search/rust",
            "tavily://other/rust",
        ] {
            assert_eq!(ResourceAddress::parse(uri), None, "{uri}");
        }
    }

    #[test]
    fn search_uri_round_trips_through_parse() {
        let query = "what is 50% of 2/3 & why?";
        assert_eq!(
            ResourceAddress::parse(&search_uri(query)),
            Some(ResourceAddress::Search {
                query: query.into()
            })
        );
    }
}
