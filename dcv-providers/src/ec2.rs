use crate::{ComputeProvider, InstanceDescription, LaunchSpec, ProviderError};
use async_trait::async_trait;
use dcv_common::InstanceState;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;

pub mod sigv4;

pub use sigv4::Credentials;

pub const EC2_API_VERSION: &str = "2016-11-15";
const SERVICE: &str = "ec2";

// Error codes EC2 documents as retryable.
const THROTTLING_CODES: &[&str] = &["RequestLimitExceeded", "Throttling", "ThrottlingException"];
const SERVER_FAULT_CODES: &[&str] = &["InternalError", "Unavailable", "ServiceUnavailable"];

/// EC2 through the Query API (form-encoded POST, XML responses, SigV4).
pub struct Ec2Provider {
    client: Client,
    region: String,
    endpoint: String,
    host: String,
    credentials: Credentials,
    parser: ResponseParser,
}

impl Ec2Provider {
    pub fn new(region: String, credentials: Credentials) -> Result<Self, ProviderError> {
        let endpoint = format!("https://ec2.{}.amazonaws.com/", region);
        Self::with_endpoint(region, credentials, &endpoint)
    }

    /// Same as [`Ec2Provider::new`] against a custom endpoint (EC2-compatible
    /// clouds, local emulators).
    pub fn with_endpoint(
        region: String,
        credentials: Credentials,
        endpoint: &str,
    ) -> Result<Self, ProviderError> {
        let parsed = url::Url::parse(endpoint)
            .map_err(|e| ProviderError::Client(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => {
                return Err(ProviderError::Client(format!(
                    "endpoint '{}' has no host",
                    endpoint
                )))
            }
        };
        // Default reqwest client has no overall timeout.
        // A stalled API call would stall the poll loop.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;
        let parser = ResponseParser::new().map_err(|e| ProviderError::Client(e.to_string()))?;
        Ok(Self {
            client,
            region: region.trim().to_string(),
            endpoint: parsed.to_string(),
            host,
            credentials,
            parser,
        })
    }

    async fn call(&self, action: &str, params: &[(&str, String)]) -> Result<String, ProviderError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("Action", action)
            .append_pair("Version", EC2_API_VERSION)
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .finish();

        let signed = sigv4::sign_form_post(
            &self.credentials,
            &self.region,
            SERVICE,
            &self.host,
            &body,
            chrono::Utc::now(),
        )?;

        tracing::debug!(endpoint = %self.endpoint, action, "[EC2 API] POST");

        let mut req = self
            .client
            .post(self.endpoint.as_str())
            .header(reqwest::header::CONTENT_TYPE, sigv4::FORM_CONTENT_TYPE)
            .header("X-Amz-Date", signed.amz_date.as_str())
            .header(reqwest::header::AUTHORIZATION, signed.authorization.as_str());
        if let Some(token) = signed.security_token.as_deref() {
            req = req.header("X-Amz-Security-Token", token);
        }

        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            let err = self.parser.classify_error(status.as_u16(), &text);
            tracing::warn!(
                action,
                status = status.as_u16(),
                error = %err,
                "[EC2 API] request failed"
            );
            return Err(err);
        }
        tracing::debug!(action, status = status.as_u16(), "[EC2 API] request succeeded");
        Ok(text)
    }
}

#[async_trait]
impl ComputeProvider for Ec2Provider {
    fn name(&self) -> &str {
        "ec2"
    }

    async fn launch_instance(&self, spec: LaunchSpec) -> Result<String, ProviderError> {
        let user_data = spec.encoded_boot_script();
        let LaunchSpec {
            image_id,
            instance_class,
            key_pair_name,
            security_group_id,
            client_token,
            ..
        } = spec;

        tracing::info!(
            region = %self.region,
            image_id = %image_id,
            instance_class = %instance_class,
            "[EC2 API] RunInstances"
        );

        let params = [
            ("ImageId", image_id),
            ("InstanceType", instance_class),
            ("MinCount", "1".to_string()),
            ("MaxCount", "1".to_string()),
            ("KeyName", key_pair_name),
            ("SecurityGroupId.1", security_group_id),
            ("UserData", user_data),
            ("ClientToken", client_token),
        ];
        let xml = self.call("RunInstances", &params).await?;
        self.parser.instance_id(&xml).ok_or_else(|| {
            ProviderError::InvalidResponse("no instanceId in RunInstances response".into())
        })
    }

    async fn describe_instance(
        &self,
        instance_id: &str,
    ) -> Result<InstanceDescription, ProviderError> {
        let xml = self
            .call("DescribeInstances", &[("InstanceId.1", instance_id.to_string())])
            .await?;
        self.parser.describe(&xml, instance_id)
    }
}

/// Pulls the handful of fields we need out of EC2's XML.
pub struct ResponseParser {
    instance_id: Regex,
    state_name: Regex,
    dns_name: Regex,
    ip_address: Regex,
    error_code: Regex,
    error_message: Regex,
}

impl ResponseParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            instance_id: Regex::new(r"<instanceId>([^<]+)</instanceId>")?,
            state_name: Regex::new(r"<instanceState>\s*<code>\d+</code>\s*<name>([^<]+)</name>")?,
            dns_name: Regex::new(r"<dnsName>([^<]+)</dnsName>")?,
            ip_address: Regex::new(r"<ipAddress>([^<]+)</ipAddress>")?,
            error_code: Regex::new(r"<Code>([^<]+)</Code>")?,
            error_message: Regex::new(r"<Message>([^<]*)</Message>")?,
        })
    }

    fn capture(re: &Regex, xml: &str) -> Option<String> {
        re.captures(xml)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn instance_id(&self, xml: &str) -> Option<String> {
        Self::capture(&self.instance_id, xml)
    }

    /// State plus public address (public DNS name, else public IPv4).
    pub fn describe(
        &self,
        xml: &str,
        instance_id: &str,
    ) -> Result<InstanceDescription, ProviderError> {
        let Some(state) = Self::capture(&self.state_name, xml) else {
            // A fresh id can be missing from DescribeInstances for a few seconds.
            if self.instance_id(xml).is_none() {
                return Err(ProviderError::NotFound(instance_id.to_string()));
            }
            return Err(ProviderError::InvalidResponse(format!(
                "no instanceState for {}",
                instance_id
            )));
        };
        let public_address = Self::capture(&self.dns_name, xml)
            .or_else(|| Self::capture(&self.ip_address, xml));
        Ok(InstanceDescription {
            state: InstanceState::parse(&state),
            public_address,
        })
    }

    pub fn classify_error(&self, status: u16, xml: &str) -> ProviderError {
        let code = Self::capture(&self.error_code, xml)
            .unwrap_or_else(|| format!("HTTP{}", status));
        let message = Self::capture(&self.error_message, xml)
            .map(|m| decode_entities(&m))
            .unwrap_or_else(|| xml.chars().take(200).collect());

        if code.starts_with("InvalidInstanceID.NotFound") {
            return ProviderError::NotFound(message);
        }
        if THROTTLING_CODES.contains(&code.as_str()) {
            return ProviderError::Throttled(format!("{}: {}", code, message));
        }
        if status >= 500 || SERVER_FAULT_CODES.contains(&code.as_str()) {
            return ProviderError::Transport(format!("{}: {}", code, message));
        }
        ProviderError::Rejected { code, message }
    }
}

/// Undo the five predefined XML entities. `&amp;` goes last so `&amp;lt;`
/// stays `&lt;`.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
