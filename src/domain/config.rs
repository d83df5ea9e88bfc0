use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::io::Read;

pub const DEFAULT_STORE_TYPE: &str = "3D_PAY_HOSTING";

/// A credential that must never end up in logs or serialized output.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("***")
    }
}

/// Merchant credentials and endpoints.
///
/// Validated on construction: a config without a client id or store key
/// cannot exist, so signing and verification never have to check for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMerchantConfig", rename_all = "camelCase")]
pub struct MerchantConfig {
    client_id: String,
    store_key: Secret,
    store_type: String,
    ok_url: String,
    fail_url: String,
    #[serde(rename = "3DGateUrl")]
    gate_url: String,
    api_name: String,
    api_password: Secret,
    api_endpoint_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMerchantConfig {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    store_key: Secret,
    #[serde(default)]
    store_type: Option<String>,
    #[serde(default)]
    ok_url: String,
    #[serde(default)]
    fail_url: String,
    #[serde(default, rename = "3DGateUrl")]
    gate_url: String,
    #[serde(default)]
    api_name: String,
    #[serde(default)]
    api_password: Secret,
    #[serde(default)]
    api_endpoint_url: String,
}

impl TryFrom<RawMerchantConfig> for MerchantConfig {
    type Error = PaymentError;

    fn try_from(raw: RawMerchantConfig) -> Result<Self> {
        let mut config = MerchantConfig::new(raw.client_id, raw.store_key.0)?
            .with_urls(raw.ok_url, raw.fail_url)
            .with_gate_url(raw.gate_url);
        if let Some(store_type) = raw.store_type.filter(|t| !t.is_empty()) {
            config.store_type = store_type;
        }
        config.api_name = raw.api_name;
        config.api_password = raw.api_password;
        config.api_endpoint_url = raw.api_endpoint_url;
        Ok(config)
    }
}

impl MerchantConfig {
    pub fn new(client_id: impl Into<String>, store_key: impl Into<String>) -> Result<Self> {
        let client_id = client_id.into();
        let store_key = Secret::new(store_key);
        if client_id.is_empty() {
            return Err(PaymentError::Configuration(
                "clientId is required".to_string(),
            ));
        }
        if store_key.is_empty() {
            return Err(PaymentError::Configuration(
                "storeKey is required".to_string(),
            ));
        }
        Ok(Self {
            client_id,
            store_key,
            store_type: DEFAULT_STORE_TYPE.to_string(),
            ok_url: String::new(),
            fail_url: String::new(),
            gate_url: String::new(),
            api_name: String::new(),
            api_password: Secret::default(),
            api_endpoint_url: String::new(),
        })
    }

    pub fn with_store_type(mut self, store_type: impl Into<String>) -> Self {
        self.store_type = store_type.into();
        self
    }

    pub fn with_urls(mut self, ok_url: impl Into<String>, fail_url: impl Into<String>) -> Self {
        self.ok_url = ok_url.into();
        self.fail_url = fail_url.into();
        self
    }

    pub fn with_gate_url(mut self, gate_url: impl Into<String>) -> Self {
        self.gate_url = gate_url.into();
        self
    }

    pub fn with_api(
        mut self,
        name: impl Into<String>,
        password: impl Into<String>,
        endpoint_url: impl Into<String>,
    ) -> Self {
        self.api_name = name.into();
        self.api_password = Secret::new(password);
        self.api_endpoint_url = endpoint_url.into();
        self
    }

    /// Reads a JSON merchant document (`clientId`, `storeKey`, `okUrl`, ...).
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Reads the config from `NESTPAY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        let mut config = Self::new(var("NESTPAY_CLIENT_ID"), var("NESTPAY_STORE_KEY"))?
            .with_urls(var("NESTPAY_OK_URL"), var("NESTPAY_FAIL_URL"))
            .with_gate_url(var("NESTPAY_3D_GATE_URL"))
            .with_api(
                var("NESTPAY_API_NAME"),
                var("NESTPAY_API_PASSWORD"),
                var("NESTPAY_API_ENDPOINT_URL"),
            );
        if let Ok(store_type) = std::env::var("NESTPAY_STORE_TYPE")
            && !store_type.is_empty()
        {
            config.store_type = store_type;
        }
        Ok(config)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn store_key(&self) -> &str {
        self.store_key.expose()
    }

    pub fn store_type(&self) -> &str {
        &self.store_type
    }

    pub fn ok_url(&self) -> &str {
        &self.ok_url
    }

    pub fn fail_url(&self) -> &str {
        &self.fail_url
    }

    pub fn gate_url(&self) -> &str {
        &self.gate_url
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    pub fn api_password(&self) -> &str {
        self.api_password.expose()
    }

    pub fn api_endpoint_url(&self) -> &str {
        &self.api_endpoint_url
    }
}
