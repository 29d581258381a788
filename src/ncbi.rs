use std::thread;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::domain::DatasetId;
use crate::error::YamasError;

const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const RUN_COLUMN: &str = "Run";

/// Resolves a BioProject or study id to the SRA run table of its sequencing runs.
pub trait RunInfoClient: Send + Sync {
    fn fetch_run_info(&self, dataset: &DatasetId) -> Result<String, YamasError>;
}

#[derive(Clone)]
pub struct EutilsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    esearchresult: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    count: String,
    webenv: Option<String>,
    querykey: Option<String>,
}

impl EutilsClient {
    pub fn new() -> Result<Self, YamasError> {
        Self::with_base_url(EUTILS_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, YamasError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("yamas/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| YamasError::RunInfoHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| YamasError::RunInfoHttp(err.to_string()))?;
        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn search(&self, dataset: &DatasetId) -> Result<SearchResult, YamasError> {
        let url = format!("{}/esearch.fcgi", self.base_url);
        let response = self.send_with_retries(|| {
            self.with_key(self.client.get(&url).query(&[
                ("db", "sra"),
                ("term", dataset.as_str()),
                ("usehistory", "y"),
                ("retmode", "json"),
            ]))
        })?;
        let response = check_status(response)?;
        let body: SearchResponse = response
            .json()
            .map_err(|err| YamasError::RunInfoHttp(err.to_string()))?;
        Ok(body.esearchresult)
    }

    fn with_key(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("api_key", key.as_str())]),
            None => request,
        }
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, YamasError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 400;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        tracing::debug!(status, attempt, "run info request throttled, retrying");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(YamasError::RunInfoHttp(err.to_string()));
                }
            }
        }
    }
}

impl RunInfoClient for EutilsClient {
    fn fetch_run_info(&self, dataset: &DatasetId) -> Result<String, YamasError> {
        let search = self.search(dataset)?;
        if search.count.trim() == "0" {
            return Err(YamasError::Input(format!(
                "no SRA runs found for {dataset}"
            )));
        }
        let (Some(webenv), Some(query_key)) = (search.webenv, search.querykey) else {
            return Err(YamasError::RunInfoHttp(
                "esearch response lacks history keys".to_string(),
            ));
        };
        tracing::info!(dataset = %dataset, runs = %search.count, "resolved dataset in SRA");

        let url = format!("{}/efetch.fcgi", self.base_url);
        let response = self.send_with_retries(|| {
            self.with_key(self.client.get(&url).query(&[
                ("db", "sra"),
                ("query_key", query_key.as_str()),
                ("WebEnv", webenv.as_str()),
                ("rettype", "runinfo"),
                ("retmode", "text"),
            ]))
        })?;
        check_status(response)?
            .text()
            .map_err(|err| YamasError::RunInfoHttp(err.to_string()))
    }
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, YamasError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .unwrap_or_else(|_| "E-utilities request failed".to_string());
    Err(YamasError::RunInfoStatus { status, message })
}

/// Run accessions from an SRA run table, in table order without duplicates.
pub fn parse_accessions(run_info: &str) -> Result<Vec<String>, YamasError> {
    let accession = Regex::new(r"^(SRR|ERR|DRR)\d+$")
        .map_err(|err| YamasError::Format(err.to_string()))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(run_info.as_bytes());
    let headers = reader
        .headers()
        .map_err(|err| YamasError::Format(err.to_string()))?
        .clone();
    let run_index = headers
        .iter()
        .position(|name| name == RUN_COLUMN)
        .unwrap_or(0);

    let mut accessions: Vec<String> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| YamasError::Format(err.to_string()))?;
        let Some(value) = record.get(run_index).map(str::trim) else {
            continue;
        };
        if accession.is_match(value) && !accessions.iter().any(|known| known == value) {
            accessions.push(value.to_string());
        }
    }
    if accessions.is_empty() {
        return Err(YamasError::Input(
            "run table contains no SRR/ERR/DRR accessions".to_string(),
        ));
    }
    Ok(accessions)
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
