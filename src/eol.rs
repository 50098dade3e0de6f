use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;

use crate::error::LangualError;

pub const DEFAULT_EOL_BASE: &str = "https://eol.org/api";
pub const NCBI_TAXONOMY_SOURCE: &str = "NCBI Taxonomy";

/// One taxon concept attached to an EOL page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonConcept {
    pub scientific_name: Option<String>,
    pub canonical_form: Option<String>,
    pub name_according_to: String,
    pub source_identifier: String,
    /// Lower-cased rank, when EOL reports one.
    pub rank: Option<String>,
}

/// The two batched lookups the taxon resolver needs.
pub trait TaxonLookupClient: Send + Sync {
    /// Authority codes -> EOL page ids, for the provider hierarchy given.
    fn search_by_provider(
        &self,
        hierarchy_id: u32,
        codes: &[String],
    ) -> Result<BTreeMap<String, String>, LangualError>;

    /// EOL page ids -> taxon concepts recorded on each page.
    fn pages(&self, page_ids: &[String])
    -> Result<BTreeMap<String, Vec<TaxonConcept>>, LangualError>;
}

#[derive(Clone)]
pub struct EolHttpClient {
    client: Client,
    base_url: String,
}

impl EolHttpClient {
    pub fn new(base_url: &str) -> Result<Self, LangualError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("langual-import/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LangualError::EolHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| LangualError::EolHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn search_url(&self, hierarchy_id: u32, codes: &[String]) -> String {
        format!(
            "{}/search_by_provider/1.0.json?batch=true&id={}&hierarchy_id={}",
            self.base_url,
            codes.join(","),
            hierarchy_id
        )
    }

    pub fn pages_url(&self, page_ids: &[String]) -> String {
        format!(
            "{}/pages/1.0.json?batch=true&id={}&subjects=overview&taxonomy=true&cache_ttl=&language=en",
            self.base_url,
            page_ids.join(",")
        )
    }

    fn get_json(&self, url: &str) -> Result<Value, LangualError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| LangualError::EolResponse(err.to_string()))
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, LangualError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "EOL request failed".to_string());
        Err(LangualError::EolStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, LangualError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(LangualError::EolHttp(err.to_string()));
                }
            }
        }
    }
}

impl TaxonLookupClient for EolHttpClient {
    fn search_by_provider(
        &self,
        hierarchy_id: u32,
        codes: &[String],
    ) -> Result<BTreeMap<String, String>, LangualError> {
        let raw = self.get_json(&self.search_url(hierarchy_id, codes))?;
        extract_page_ids(&raw)
    }

    fn pages(
        &self,
        page_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<TaxonConcept>>, LangualError> {
        let raw = self.get_json(&self.pages_url(page_ids))?;
        extract_taxon_concepts(&raw)
    }
}

/// Reads a `search_by_provider` batch response:
/// `[{"180722": [{"eol_page_id": 328663}, {"eol_page_link": "eol.org/pages/328663"}]}]`.
pub fn extract_page_ids(raw: &Value) -> Result<BTreeMap<String, String>, LangualError> {
    let items = raw
        .as_array()
        .ok_or_else(|| LangualError::EolResponse("expected a JSON array".to_string()))?;
    let mut pages = BTreeMap::new();
    for item in items {
        let Some(object) = item.as_object() else {
            continue;
        };
        for (code, fields) in object {
            let page_id = fields
                .as_array()
                .into_iter()
                .flatten()
                .find_map(|field| field.get("eol_page_id"))
                .and_then(json_id);
            if let Some(page_id) = page_id {
                pages.insert(code.clone(), page_id);
            }
        }
    }
    Ok(pages)
}

/// Reads a `pages` batch response:
/// `[{"328663": {"taxonConcepts": [{"nameAccordingTo": "NCBI Taxonomy", "sourceIdentifier": "9823", "taxonRank": "Species", ...}]}}]`.
pub fn extract_taxon_concepts(
    raw: &Value,
) -> Result<BTreeMap<String, Vec<TaxonConcept>>, LangualError> {
    let items = raw
        .as_array()
        .ok_or_else(|| LangualError::EolResponse("expected a JSON array".to_string()))?;
    let mut pages = BTreeMap::new();
    for item in items {
        let Some(object) = item.as_object() else {
            continue;
        };
        for (page_id, page) in object {
            let concepts = page
                .get("taxonConcepts")
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
                .filter_map(parse_concept)
                .collect::<Vec<_>>();
            pages.insert(page_id.clone(), concepts);
        }
    }
    Ok(pages)
}

fn parse_concept(value: &Value) -> Option<TaxonConcept> {
    let name_according_to = value.get("nameAccordingTo")?.as_str()?.to_string();
    let source_identifier = value.get("sourceIdentifier").and_then(json_id)?;
    Some(TaxonConcept {
        scientific_name: string_field(value, "scientificName"),
        canonical_form: string_field(value, "canonicalForm"),
        name_according_to,
        source_identifier,
        rank: string_field(value, "taxonRank")
            .map(|rank| rank.trim().to_lowercase())
            .filter(|rank| !rank.is_empty()),
    })
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// EOL ids arrive as numbers or strings depending on the endpoint.
fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
