use crate::domain::config::MerchantConfig;
use crate::domain::hash::{self, HashAlgorithm, HashInput};
use crate::domain::payment::{Payment, PaymentState};
use crate::domain::ports::{GatewayClientBox, PaymentObserverBox, PaymentStoreBox};
use crate::error::{FieldMap, PaymentError, ResponseRejection, Result};
use crate::infrastructure::in_memory::InMemoryPaymentStore;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

/// Payment properties that the request builder writes under their wire names
/// instead of copying them through.
const REQUEST_EXCLUDED_PROPERTIES: [&str; 7] = [
    "processed",
    "oid",
    "amount",
    "trantype",
    "currency",
    "rnd",
    "lang",
];

/// How an operation picks its working payment.
#[derive(Debug, Clone)]
pub enum PaymentSource {
    Payment(Payment),
    /// Load by order id; fails if the store has no such payment.
    Oid(String),
    /// Load by the `oid` property if it is stored, otherwise create a new
    /// payment from the properties.
    Fields(FieldMap),
}

impl From<Payment> for PaymentSource {
    fn from(payment: Payment) -> Self {
        Self::Payment(payment)
    }
}

impl From<&str> for PaymentSource {
    fn from(oid: &str) -> Self {
        Self::Oid(oid.to_string())
    }
}

impl From<String> for PaymentSource {
    fn from(oid: String) -> Self {
        Self::Oid(oid)
    }
}

impl From<FieldMap> for PaymentSource {
    fn from(fields: FieldMap) -> Self {
        Self::Fields(fields)
    }
}

/// Which merchant page the gateway redirected the customer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnChannel {
    #[default]
    OkUrl,
    FailUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Notify the observer of success, failure and errors.
    pub notify: bool,
    /// Return errors to the caller. When false the error only reaches the
    /// observer and the best-known payment is returned.
    pub raise_on_error: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            notify: true,
            raise_on_error: true,
        }
    }
}

/// Signed fields plus the gateway URL they have to be posted to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestForm {
    pub action: String,
    pub fields: FieldMap,
}

/// A callback whose signature has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCallback {
    pub oid: String,
    pub algorithm: HashAlgorithm,
}

/// Everything an orchestrator is made of.
pub struct OrchestratorComponents {
    pub config: MerchantConfig,
    pub store: PaymentStoreBox,
    pub gateway: Option<GatewayClientBox>,
    pub observer: Option<PaymentObserverBox>,
    pub working_payment: Option<Payment>,
}

/// Drives one payment through signing, callback verification and
/// reconciliation.
///
/// An orchestrator serves a single request and holds at most one working
/// payment. Anything that must survive the request goes through the store.
pub struct PaymentOrchestrator {
    config: MerchantConfig,
    store: PaymentStoreBox,
    gateway: Option<GatewayClientBox>,
    observer: Option<PaymentObserverBox>,
    working: Option<Payment>,
}

impl PaymentOrchestrator {
    /// An orchestrator with only merchant credentials, backed by a private
    /// in-memory store.
    pub fn from_merchant_config(config: MerchantConfig) -> Self {
        Self {
            config,
            store: Box::new(InMemoryPaymentStore::new()),
            gateway: None,
            observer: None,
            working: None,
        }
    }

    pub fn from_components(components: OrchestratorComponents) -> Self {
        Self {
            config: components.config,
            store: components.store,
            gateway: components.gateway,
            observer: components.observer,
            working: components.working_payment,
        }
    }

    pub fn with_store(mut self, store: PaymentStoreBox) -> Self {
        self.store = store;
        self
    }

    pub fn with_gateway(mut self, gateway: GatewayClientBox) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_observer(mut self, observer: PaymentObserverBox) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &MerchantConfig {
        &self.config
    }

    pub fn working_payment(&self) -> Option<&Payment> {
        self.working.as_ref()
    }

    /// Resolves `source` into the working payment.
    pub async fn set_working_payment(&mut self, source: PaymentSource) -> Result<&Payment> {
        let payment = match source {
            PaymentSource::Payment(payment) => payment,
            PaymentSource::Oid(oid) => self
                .store
                .load(&oid)
                .await?
                .ok_or(PaymentError::PaymentNotFound(oid))?,
            PaymentSource::Fields(fields) => {
                let stored = match fields.get("oid").filter(|oid| !oid.is_empty()) {
                    Some(oid) => self.store.load(oid).await?,
                    None => None,
                };
                match stored {
                    Some(payment) => payment,
                    None => self.store.create(&fields).await?,
                }
            }
        };
        Ok(self.working.insert(payment))
    }

    async fn resolve(&mut self, source: Option<PaymentSource>) -> Result<()> {
        if let Some(source) = source {
            self.set_working_payment(source).await?;
        }
        Ok(())
    }

    /// Builds the signed field set the customer's browser posts to the 3D
    /// gate, and persists the payment so the callback can be matched to it.
    #[instrument(skip_all, fields(oid = tracing::field::Empty, algorithm = %algorithm))]
    pub async fn build_request_parameters(
        &mut self,
        source: Option<PaymentSource>,
        algorithm: HashAlgorithm,
    ) -> Result<FieldMap> {
        self.resolve(source).await?;
        let payment = self.working.as_mut().ok_or_else(no_working_payment)?;
        tracing::Span::current().record("oid", payment.oid());

        let config = &self.config;
        let amount = payment.formatted_amount();
        let tran_type = payment.tran_type().to_string();
        let instalment = payment
            .instalment()
            .map(|i| i.to_string())
            .unwrap_or_default();

        let signed = [
            config.client_id(),
            payment.oid(),
            amount.as_str(),
            config.ok_url(),
            config.fail_url(),
            tran_type.as_str(),
            instalment.as_str(),
            payment.rnd(),
            "",
            "",
            "",
            payment.currency(),
        ];
        let hash = hash::compute_hash(config.store_key(), HashInput::Ordered(&signed), algorithm);

        let mut params = payment.properties();
        for key in REQUEST_EXCLUDED_PROPERTIES {
            params.remove(key);
        }
        let fixed = [
            ("clientid", config.client_id()),
            ("storetype", config.store_type()),
            ("okurl", config.ok_url()),
            ("failUrl", config.fail_url()),
            ("oid", payment.oid()),
            ("amount", amount.as_str()),
            ("TranType", tran_type.as_str()),
            ("currency", payment.currency()),
            ("rnd", payment.rnd()),
            ("lang", payment.lang().unwrap_or_default()),
            ("hashAlgorithm", algorithm.as_str()),
            ("hash", hash.as_str()),
        ];
        for (key, value) in fixed {
            params.insert(key.to_string(), value.to_string());
        }

        let mut pending = payment.clone();
        pending.mark_pending();
        self.store.save(&pending).await?;
        *payment = pending;

        info!(amount = %amount, "request parameters signed");
        Ok(params)
    }

    /// Same as [`Self::build_request_parameters`], with the configured 3D gate
    /// URL as the form action.
    pub async fn build_request_form(
        &mut self,
        source: Option<PaymentSource>,
        algorithm: HashAlgorithm,
    ) -> Result<RequestForm> {
        let fields = self.build_request_parameters(source, algorithm).await?;
        Ok(RequestForm {
            action: self.config.gate_url().to_string(),
            fields,
        })
    }

    /// Checks the required fields and the signature of a gateway callback.
    pub fn verify_callback(&self, response: &FieldMap) -> Result<VerifiedCallback> {
        let reject = |reason| PaymentError::invalid_response(reason, response);

        if response.get("Response").is_none_or(|r| r.is_empty()) {
            return Err(reject(ResponseRejection::MissingResponse));
        }

        let client_id = response
            .get("clientid")
            .ok_or_else(|| reject(ResponseRejection::MissingClientId))?;
        if client_id != self.config.client_id() {
            return Err(reject(ResponseRejection::ClientIdMismatch(
                client_id.clone(),
            )));
        }

        let oid = response
            .get("oid")
            .or_else(|| response.get("ReturnOid"))
            .ok_or_else(|| reject(ResponseRejection::MissingOid))?;
        if oid.is_empty() {
            return Err(reject(ResponseRejection::InvalidOid));
        }

        let received = response
            .get("HASH")
            .ok_or_else(|| reject(ResponseRejection::MissingHash))?;
        let hash_params = response
            .get("HASHPARAMS")
            .ok_or_else(|| reject(ResponseRejection::MissingHashParams))?;

        let algorithm = match response.get("hashAlgorithm").map(String::as_str) {
            None | Some("") => HashAlgorithm::default(),
            Some(name) => name.parse().map_err(|_| {
                reject(ResponseRejection::UnsupportedHashAlgorithm(name.to_string()))
            })?,
        };

        let values: Vec<&str> = hash_params
            .split(algorithm.params_separator())
            .map(|field| response.get(field).map(String::as_str).unwrap_or_default())
            .collect();
        let calculated =
            hash::compute_hash(self.config.store_key(), HashInput::Ordered(&values), algorithm);
        if &calculated != received {
            return Err(PaymentError::HashMismatch {
                calculated,
                received: received.clone(),
                response: response.clone(),
            });
        }

        Ok(VerifiedCallback {
            oid: oid.clone(),
            algorithm,
        })
    }

    /// Verifies a 3D gate callback and moves the payment into its terminal
    /// state, at most once per order.
    #[instrument(skip_all, fields(oid = tracing::field::Empty, channel = ?channel))]
    pub async fn process_gateway_callback(
        &mut self,
        response: &FieldMap,
        channel: ReturnChannel,
        options: ProcessOptions,
    ) -> Result<Payment> {
        match self.apply_callback(response, channel).await {
            Ok(payment) => {
                if options.notify {
                    self.notify_outcome(payment.state() == PaymentState::ProcessedSuccess);
                }
                Ok(payment)
            }
            Err(err) => {
                self.report_error(&err, Some(response), options.notify);
                if options.raise_on_error {
                    return Err(err);
                }
                self.working.clone().ok_or(err)
            }
        }
    }

    async fn apply_callback(&mut self, response: &FieldMap, channel: ReturnChannel) -> Result<Payment> {
        let verified = self.verify_callback(response)?;
        tracing::Span::current().record("oid", verified.oid.as_str());
        debug!(algorithm = %verified.algorithm, "callback signature verified");

        let payment = match self.store.load(&verified.oid).await? {
            Some(stored) if stored.is_processed() => {
                self.working = Some(stored);
                warn!("duplicate callback for processed payment");
                return Err(PaymentError::AlreadyProcessed {
                    oid: verified.oid,
                });
            }
            Some(mut stored) => {
                stored.merge_callback_fields(response);
                stored
            }
            None => {
                let mut fields = response.clone();
                fields.remove("processed");
                fields.insert("oid".to_string(), verified.oid.clone());
                self.store.create(&fields).await?
            }
        };

        let succeeded = payment.is_success() && channel == ReturnChannel::OkUrl;
        let mut processed = payment.clone();
        processed.set_processed(succeeded)?;
        self.working = Some(payment);
        if !self.store.save_processed(&processed).await? {
            warn!("payment was processed concurrently");
            if let Some(stored) = self.store.load(&verified.oid).await? {
                self.working = Some(stored);
            }
            return Err(PaymentError::AlreadyProcessed {
                oid: verified.oid,
            });
        }

        info!(state = ?processed.state(), "callback processed");
        self.working = Some(processed.clone());
        Ok(processed)
    }

    /// Pulls the authoritative status from the gateway and applies it.
    #[instrument(skip_all, fields(oid = tracing::field::Empty, force_reprocess = force_reprocess))]
    pub async fn reconcile_with_gateway(
        &mut self,
        source: Option<PaymentSource>,
        force_reprocess: bool,
        options: ProcessOptions,
    ) -> Result<Payment> {
        self.resolve(source).await?;
        let payment = self.working.as_ref().ok_or_else(no_working_payment)?;
        tracing::Span::current().record("oid", payment.oid());

        if payment.is_processed() && !force_reprocess {
            debug!("payment already processed, skipping gateway query");
            return Ok(payment.clone());
        }

        match self.query_and_apply().await {
            Ok(true) => {
                // The freshly applied gateway status decides, not the state
                // frozen by an earlier transition.
                let succeeded = self.working.as_ref().is_some_and(Payment::is_success);
                if options.notify {
                    self.notify_outcome(succeeded);
                }
            }
            Ok(false) => {}
            Err(err) => {
                self.report_error(&err, None, options.notify);
                if options.raise_on_error {
                    return Err(err);
                }
            }
        }
        self.working.clone().ok_or_else(no_working_payment)
    }

    /// Returns whether the payment is processed after applying the gateway
    /// status.
    async fn query_and_apply(&mut self) -> Result<bool> {
        let gateway = self.gateway.as_ref().ok_or_else(|| {
            PaymentError::Configuration("no gateway client configured".to_string())
        })?;
        let Some(payment) = self.working.as_mut() else {
            return Ok(false);
        };

        let Some(fields) = gateway.query_status(payment.oid()).await? else {
            info!("gateway has no record of the payment");
            return Ok(false);
        };

        let was_processed = payment.is_processed();
        let mut updated = payment.clone();
        updated.apply_fields(&fields)?;

        if !was_processed && updated.is_processed() {
            if !self.store.save_processed(&updated).await? {
                warn!("payment was processed concurrently");
                return Err(PaymentError::AlreadyProcessed {
                    oid: updated.oid().to_string(),
                });
            }
        } else {
            self.store.save(&updated).await?;
        }
        *payment = updated;

        info!(state = ?payment.state(), "payment reconciled with gateway");
        Ok(payment.is_processed())
    }

    /// Captures a pre-authorized payment. `amount` defaults to the payment's
    /// own amount. Returns `None` when an error was suppressed.
    #[instrument(skip_all, fields(oid = tracing::field::Empty))]
    pub async fn request_post_authorization(
        &mut self,
        source: Option<PaymentSource>,
        amount: Option<Decimal>,
        options: ProcessOptions,
    ) -> Result<Option<FieldMap>> {
        self.resolve(source).await?;
        let payment = self.working.as_ref().ok_or_else(no_working_payment)?;
        tracing::Span::current().record("oid", payment.oid());
        let amount = amount.unwrap_or(payment.amount());
        let oid = payment.oid().to_string();

        let result = match self.gateway.as_ref() {
            Some(gateway) => gateway.post_authorization(&oid, Some(amount)).await,
            None => Err(PaymentError::Configuration(
                "no gateway client configured".to_string(),
            )),
        };
        self.admin_result(result, options)
    }

    /// Voids a payment on the gateway. Returns `None` when an error was
    /// suppressed.
    #[instrument(skip_all, fields(oid = tracing::field::Empty))]
    pub async fn request_void(
        &mut self,
        source: Option<PaymentSource>,
        options: ProcessOptions,
    ) -> Result<Option<FieldMap>> {
        self.resolve(source).await?;
        let payment = self.working.as_ref().ok_or_else(no_working_payment)?;
        tracing::Span::current().record("oid", payment.oid());
        let oid = payment.oid().to_string();

        let result = match self.gateway.as_ref() {
            Some(gateway) => gateway.void(&oid).await,
            None => Err(PaymentError::Configuration(
                "no gateway client configured".to_string(),
            )),
        };
        self.admin_result(result, options)
    }

    fn admin_result(
        &mut self,
        result: Result<FieldMap>,
        options: ProcessOptions,
    ) -> Result<Option<FieldMap>> {
        match result {
            Ok(fields) => Ok(Some(fields)),
            Err(err) => {
                self.report_error(&err, None, options.notify);
                if options.raise_on_error {
                    Err(err)
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn notify_outcome(&self, succeeded: bool) {
        let (Some(observer), Some(payment)) = (self.observer.as_ref(), self.working.as_ref()) else {
            return;
        };
        if succeeded {
            observer.on_success(payment);
        } else {
            observer.on_failure(payment);
        }
    }

    /// Logs an error and hands it to the observer together with the working
    /// payment, synthesizing one from the raw response if needed.
    fn report_error(&mut self, err: &PaymentError, response: Option<&FieldMap>, notify: bool) {
        error!(category = ?err.category(), retryable = err.is_retryable(), "{err}");

        if self.working.is_none()
            && let Some(response) = response
        {
            self.working = Some(synthesize_payment(response));
        }

        if notify
            && let (Some(observer), Some(payment)) = (self.observer.as_ref(), self.working.as_ref())
        {
            observer.on_error(payment, err);
        }
    }
}

fn no_working_payment() -> PaymentError {
    PaymentError::Configuration("no working payment selected".to_string())
}

/// Best-effort payment built from a raw, possibly invalid, gateway response.
fn synthesize_payment(response: &FieldMap) -> Payment {
    let mut fields = response.clone();
    fields.remove("processed");
    if let Some(oid) = response.get("oid").or_else(|| response.get("ReturnOid"))
        && !oid.is_empty()
    {
        fields.insert("oid".to_string(), oid.clone());
    }
    Payment::from_fields(&fields).unwrap_or_else(|_| {
        let oid = fields
            .get("oid")
            .filter(|oid| !oid.is_empty())
            .cloned()
            .unwrap_or_else(crate::domain::payment::generate_oid);
        Payment::new(oid, Decimal::ZERO, "")
    })
}
