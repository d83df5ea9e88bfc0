use crate::error::{FieldMap, PaymentError, Result};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

const RND_LENGTH: usize = 20;

/// Fields of a [`Payment`] that have a typed home on the struct.
///
/// Anything else the gateway sends lands in the payment's extension map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentField {
    Oid,
    Amount,
    Currency,
    TranType,
    Instalment,
    Rnd,
    Lang,
    Processed,
    Response,
    AuthCode,
    ProcReturnCode,
    MdStatus,
    HostRefNum,
    TransId,
    ErrMsg,
}

impl PaymentField {
    pub const ALL: [PaymentField; 15] = [
        Self::Oid,
        Self::Amount,
        Self::Currency,
        Self::TranType,
        Self::Instalment,
        Self::Rnd,
        Self::Lang,
        Self::Processed,
        Self::Response,
        Self::AuthCode,
        Self::ProcReturnCode,
        Self::MdStatus,
        Self::HostRefNum,
        Self::TransId,
        Self::ErrMsg,
    ];

    /// Canonical property name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Oid => "oid",
            Self::Amount => "amount",
            Self::Currency => "currency",
            Self::TranType => "trantype",
            Self::Instalment => "instalment",
            Self::Rnd => "rnd",
            Self::Lang => "lang",
            Self::Processed => "processed",
            Self::Response => "Response",
            Self::AuthCode => "AuthCode",
            Self::ProcReturnCode => "ProcReturnCode",
            Self::MdStatus => "mdStatus",
            Self::HostRefNum => "HostRefNum",
            Self::TransId => "TransId",
            Self::ErrMsg => "ErrMsg",
        }
    }

    /// Resolves a property name, ignoring ASCII case (`TranType` and
    /// `trantype` are the same field).
    pub fn lookup(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.name().eq_ignore_ascii_case(key))
    }

    /// Outcome fields reported by the gateway. A callback always overwrites
    /// them.
    pub fn is_authoritative(&self) -> bool {
        matches!(
            self,
            Self::Response
                | Self::AuthCode
                | Self::ProcReturnCode
                | Self::MdStatus
                | Self::HostRefNum
                | Self::TransId
                | Self::ErrMsg
        )
    }
}

/// Protocol fields that describe the exchange itself. They are never stored
/// on a payment.
pub const CONTROL_FIELDS: [&str; 9] = [
    "HASH",
    "HASHPARAMS",
    "HASHPARAMSVAL",
    "hashAlgorithm",
    "clientid",
    "storetype",
    "okurl",
    "failUrl",
    "encoding",
];

pub fn is_control_field(key: &str) -> bool {
    CONTROL_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(key))
}

/// Gateway transaction type (`TranType` on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TranType {
    #[default]
    Auth,
    PreAuth,
    PostAuth,
    Void,
    Credit,
    Other(String),
}

impl TranType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Auth => "Auth",
            Self::PreAuth => "PreAuth",
            Self::PostAuth => "PostAuth",
            Self::Void => "Void",
            Self::Credit => "Credit",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for TranType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Auth" => Self::Auth,
            "PreAuth" => Self::PreAuth,
            "PostAuth" => Self::PostAuth,
            "Void" => Self::Void,
            "Credit" => Self::Credit,
            _ => Self::Other(value),
        }
    }
}

impl From<TranType> for String {
    fn from(value: TranType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TranType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a payment. `ProcessedSuccess` and `ProcessedFailed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    #[default]
    New,
    Pending,
    ProcessedSuccess,
    ProcessedFailed,
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ProcessedSuccess | Self::ProcessedFailed)
    }
}

/// Outcome fields reported by the gateway for a payment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub response: Option<String>,
    pub auth_code: Option<String>,
    pub proc_return_code: Option<String>,
    pub md_status: Option<String>,
    pub host_ref_num: Option<String>,
    pub trans_id: Option<String>,
    pub err_msg: Option<String>,
}

/// One payment attempt for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    oid: String,
    amount: Decimal,
    currency: String,
    tran_type: TranType,
    instalment: Option<u32>,
    rnd: String,
    lang: Option<String>,
    state: PaymentState,
    gateway: GatewayResponse,
    #[serde(default)]
    extra: FieldMap,
}

/// Generates a merchant-side order id.
pub fn generate_oid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Generates a fresh signing nonce.
pub fn generate_rnd() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RND_LENGTH)
        .map(char::from)
        .collect()
}

/// Formats an amount the way the gateway signs it: two decimals, `.` separator.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.2}")
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes")
}

impl Payment {
    pub fn new(oid: impl Into<String>, amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            amount,
            currency: currency.into(),
            tran_type: TranType::Auth,
            instalment: None,
            rnd: generate_rnd(),
            lang: None,
            state: PaymentState::New,
            gateway: GatewayResponse::default(),
            extra: FieldMap::new(),
        }
    }

    /// Builds a payment from a flat property set.
    ///
    /// A missing `oid` is generated, the transaction type defaults to `Auth`
    /// and a fresh nonce is drawn unless `rnd` is given.
    pub fn from_fields(fields: &FieldMap) -> Result<Self> {
        let mut payment = Self::new(generate_oid(), Decimal::ZERO, "");
        payment.apply_fields(fields)?;
        Ok(payment)
    }

    pub fn oid(&self) -> &str {
        &self.oid
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn formatted_amount(&self) -> String {
        format_amount(self.amount)
    }

    pub fn set_amount(&mut self, amount: Decimal) {
        self.amount = amount;
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn set_currency(&mut self, currency: impl Into<String>) {
        self.currency = currency.into();
    }

    pub fn tran_type(&self) -> &TranType {
        &self.tran_type
    }

    pub fn set_tran_type(&mut self, tran_type: TranType) {
        self.tran_type = tran_type;
    }

    pub fn instalment(&self) -> Option<u32> {
        self.instalment
    }

    pub fn set_instalment(&mut self, instalment: Option<u32>) {
        self.instalment = instalment;
    }

    pub fn rnd(&self) -> &str {
        &self.rnd
    }

    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    pub fn set_lang(&mut self, lang: impl Into<String>) {
        self.lang = non_empty(&lang.into());
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    pub fn is_processed(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn gateway(&self) -> &GatewayResponse {
        &self.gateway
    }

    pub fn extra(&self) -> &FieldMap {
        &self.extra
    }

    /// Whether the gateway reported an approved transaction.
    pub fn is_success(&self) -> bool {
        let approved = self.gateway.response.as_deref() == Some("Approved");
        let return_code_ok = matches!(self.gateway.proc_return_code.as_deref(), None | Some("00"));
        approved && return_code_ok
    }

    /// Records that the payment has been stored and handed to the gateway.
    pub fn mark_pending(&mut self) {
        if self.state == PaymentState::New {
            self.state = PaymentState::Pending;
        }
    }

    /// The only way into a terminal state. Fails if the payment already is in
    /// one.
    pub fn set_processed(&mut self, succeeded: bool) -> Result<()> {
        if self.is_processed() {
            return Err(PaymentError::AlreadyProcessed {
                oid: self.oid.clone(),
            });
        }
        self.state = if succeeded {
            PaymentState::ProcessedSuccess
        } else {
            PaymentState::ProcessedFailed
        };
        Ok(())
    }

    pub fn get_property(&self, key: &str) -> Option<String> {
        let Some(field) = PaymentField::lookup(key) else {
            return self.extra.get(key).cloned();
        };
        let gw = &self.gateway;
        match field {
            PaymentField::Oid => non_empty(&self.oid),
            PaymentField::Amount => Some(self.formatted_amount()),
            PaymentField::Currency => non_empty(&self.currency),
            PaymentField::TranType => Some(self.tran_type.to_string()),
            PaymentField::Instalment => self.instalment.map(|i| i.to_string()),
            PaymentField::Rnd => non_empty(&self.rnd),
            PaymentField::Lang => self.lang.clone(),
            PaymentField::Processed => self.is_processed().then(|| "1".to_string()),
            PaymentField::Response => gw.response.clone(),
            PaymentField::AuthCode => gw.auth_code.clone(),
            PaymentField::ProcReturnCode => gw.proc_return_code.clone(),
            PaymentField::MdStatus => gw.md_status.clone(),
            PaymentField::HostRefNum => gw.host_ref_num.clone(),
            PaymentField::TransId => gw.trans_id.clone(),
            PaymentField::ErrMsg => gw.err_msg.clone(),
        }
    }

    /// Whether a property currently holds no value.
    pub fn is_property_empty(&self, key: &str) -> bool {
        self.get_property(key).is_none_or(|v| v.is_empty())
    }

    /// Sets a property by name.
    ///
    /// Control fields are ignored. `processed` can only move the payment into
    /// a terminal state; falsy values are ignored.
    pub fn set_property(&mut self, key: &str, value: &str) -> Result<()> {
        if is_control_field(key) {
            return Ok(());
        }
        let Some(field) = PaymentField::lookup(key) else {
            self.extra.insert(key.to_string(), value.to_string());
            return Ok(());
        };
        let invalid = || PaymentError::InvalidField {
            field: field.name().to_string(),
            value: value.to_string(),
        };
        match field {
            PaymentField::Oid => {
                if value.is_empty() {
                    return Err(invalid());
                }
                self.oid = value.to_string();
            }
            PaymentField::Amount => {
                if !value.trim().is_empty() {
                    self.amount = Decimal::from_str(value.trim()).map_err(|_| invalid())?;
                }
            }
            PaymentField::Currency => self.currency = value.to_string(),
            PaymentField::TranType => {
                if !value.is_empty() {
                    self.tran_type = TranType::from(value.to_string());
                }
            }
            PaymentField::Instalment => {
                self.instalment = match value.trim() {
                    "" => None,
                    n => Some(n.parse().map_err(|_| invalid())?),
                };
            }
            PaymentField::Rnd => {
                if !value.is_empty() {
                    self.rnd = value.to_string();
                }
            }
            PaymentField::Lang => self.set_lang(value),
            PaymentField::Processed => {
                if is_truthy(value) && !self.is_processed() {
                    let succeeded = self.is_success();
                    self.set_processed(succeeded)?;
                }
            }
            PaymentField::Response => self.gateway.response = non_empty(value),
            PaymentField::AuthCode => self.gateway.auth_code = non_empty(value),
            PaymentField::ProcReturnCode => self.gateway.proc_return_code = non_empty(value),
            PaymentField::MdStatus => self.gateway.md_status = non_empty(value),
            PaymentField::HostRefNum => self.gateway.host_ref_num = non_empty(value),
            PaymentField::TransId => self.gateway.trans_id = non_empty(value),
            PaymentField::ErrMsg => self.gateway.err_msg = non_empty(value),
        }
        Ok(())
    }

    /// Overwrites properties from `fields`. `processed` is applied last so the
    /// terminal state reflects the other fields of the same update.
    pub fn apply_fields(&mut self, fields: &FieldMap) -> Result<()> {
        let mut processed = None;
        for (key, value) in fields {
            if PaymentField::lookup(key) == Some(PaymentField::Processed) {
                processed = Some(value);
                continue;
            }
            self.set_property(key, value)?;
        }
        if let Some(value) = processed {
            self.set_property(PaymentField::Processed.name(), value)?;
        }
        Ok(())
    }

    /// Merges a verified gateway callback into a stored payment.
    ///
    /// Outcome fields always overwrite. Everything else only fills properties
    /// that are still empty, so data submitted with the original request
    /// survives blank echoes. `processed` is never taken from a callback.
    /// Echoed values that do not parse are skipped, since the callback has
    /// already been authenticated as a whole.
    pub fn merge_callback_fields(&mut self, fields: &FieldMap) {
        for (key, value) in fields {
            let field = PaymentField::lookup(key);
            if field == Some(PaymentField::Processed) {
                continue;
            }
            let authoritative = field.is_some_and(|f| f.is_authoritative());
            if (authoritative || self.is_property_empty(key))
                && let Err(err) = self.set_property(key, value)
            {
                warn!(oid = %self.oid, field = %key, "skipping callback field: {err}");
            }
        }
    }

    /// All non-empty properties keyed by their canonical names.
    pub fn properties(&self) -> FieldMap {
        let mut out: FieldMap = PaymentField::ALL
            .iter()
            .filter_map(|f| {
                self.get_property(f.name())
                    .filter(|v| !v.is_empty())
                    .map(|v| (f.name().to_string(), v))
            })
            .collect();
        for (key, value) in &self.extra {
            if !value.is_empty() {
                out.insert(key.clone(), value.clone());
            }
        }
        out
    }
}
