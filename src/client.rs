//! API Client
//!
//! Typed wrapper over the REST surface, one method per frontend call site.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::analyzers::ai::{AiReview, Consumer};
use crate::analyzers::contract::ContractAnalysis;
use crate::analyzers::gpr::{
    EarlyRepaymentCompensation, EarlyRepaymentRequest, GprCalculation, GprRequest, GprVerification,
    GprVerifyRequest,
};
use crate::analyzers::DetectedClause;
use crate::registry::{CreditorProfile, CreditorQuery, RegistryStats, SearchPage};
use crate::server::{ComplaintRequest, ComplaintResponse};

#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with a non-2xx status.
    #[error("API error {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(base_url, Client::new())
    }

    pub fn with_http(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> ClientResult<Value> {
        self.send_json(self.http.get(self.url("/health"))).await
    }

    pub async fn stats(&self) -> ClientResult<RegistryStats> {
        self.send_json(self.http.get(self.url("/api/stats"))).await
    }

    pub async fn calculate_gpr(&self, req: &GprRequest) -> ClientResult<GprCalculation> {
        self.post_json("/api/gpr/calculate", req).await
    }

    pub async fn verify_gpr(&self, declared_gpr: f64, loan: &GprRequest) -> ClientResult<GprVerification> {
        let req = GprVerifyRequest {
            declared_gpr,
            loan: loan.clone(),
        };
        self.post_json("/api/gpr/verify", &req).await
    }

    pub async fn early_repayment(&self, req: &EarlyRepaymentRequest) -> ClientResult<EarlyRepaymentCompensation> {
        self.post_json("/api/gpr/early-repayment", req).await
    }

    pub async fn analyze_contract(&self, filename: &str, bytes: Vec<u8>) -> ClientResult<ContractAnalysis> {
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part("file", part);
        self.send_json(self.http.post(self.url("/api/contract/analyze")).multipart(form))
            .await
    }

    /// LLM review of a contract with a complaint drafted for `consumer`.
    pub async fn ai_analyze(&self, filename: &str, bytes: Vec<u8>, consumer: &Consumer) -> ClientResult<AiReview> {
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part("file", part);
        let request = self.http.post(self.url("/api/ai/analyze")).query(consumer).multipart(form);
        self.send_json(request).await
    }

    pub async fn creditor(&self, name: &str) -> ClientResult<CreditorProfile> {
        let path = format!("/api/creditor/{}", urlencoding::encode(name));
        self.send_json(self.http.get(self.url(&path))).await
    }

    pub async fn creditor_report(&self, name: &str) -> ClientResult<String> {
        let path = format!("/api/creditor/{}/report", urlencoding::encode(name));
        let response = self.send(self.http.get(self.url(&path))).await?;
        Ok(response.text().await?)
    }

    pub async fn search_creditors(&self, query: &CreditorQuery) -> ClientResult<SearchPage> {
        let request = self.http.get(self.url("/api/creditors")).query(&query.to_pairs());
        self.send_json(request).await
    }

    pub async fn complaint(&self, creditor: &str, clauses: &[DetectedClause]) -> ClientResult<ComplaintResponse> {
        let req = ComplaintRequest {
            creditor: creditor.to_string(),
            clauses: clauses.to_vec(),
            date: None,
        };
        self.post_json("/api/complaint", &req).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(self.http.post(self.url(path)).json(body)).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url());
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text);
        Err(ClientError::Api {
            status: status.as_u16(),
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trimmed() {
        let client = ApiClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/health"), "http://localhost:8000/health");
    }

    #[test]
    fn test_api_error_display() {
        let err = ClientError::Api {
            status: 404,
            detail: "Кредитор не намерен".into(),
        };
        assert_eq!(err.to_string(), "API error 404: Кредитор не намерен");
    }
}
