use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::crypto::{key_exchange, CertVerifier};
use crate::curve::{self, SECP256R1, SECP384R1};
use crate::message::CipherSuite;
use crate::Error;

/// DTLS configuration
#[derive(Clone)]
pub struct Config {
    mtu: usize,
    max_queue_rx: usize,
    max_queue_tx: usize,
    require_client_certificate: bool,
    flight_start_rto: Duration,
    flight_max_rto: Duration,
    flight_retries: usize,
    handshake_timeout: Duration,
    idle_timeout: Duration,
    cipher_suites: Vec<CipherSuite>,
    named_curves: Vec<u16>,
    cookie_exchange: bool,
    allow_anonymous_key_exchange: bool,
    session_cache_size: usize,
    rng_seed: Option<u64>,
    cert_verifier: Option<Arc<dyn CertVerifier>>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            mtu: 1150,
            max_queue_rx: 30,
            max_queue_tx: 10,
            require_client_certificate: false,
            flight_start_rto: Duration::from_secs(1),
            flight_max_rto: Duration::from_secs(60),
            flight_retries: 4,
            handshake_timeout: Duration::from_secs(40),
            idle_timeout: Duration::from_secs(600),
            cipher_suites: CipherSuite::all().to_vec(),
            named_curves: vec![SECP256R1, SECP384R1],
            cookie_exchange: true,
            allow_anonymous_key_exchange: false,
            session_cache_size: 64,
            rng_seed: None,
            cert_verifier: None,
        }
    }

    /// Max transmission unit.
    ///
    /// The largest size UDP packets we will produce.
    #[inline(always)]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Max amount of incoming records to buffer before rejecting more input.
    ///
    /// Bounds handshake fragments waiting for reassembly, and separately the
    /// records of an epoch that is not active yet.
    #[inline(always)]
    pub fn max_queue_rx(&self) -> usize {
        self.max_queue_rx
    }

    /// Max amount of outgoing packets to buffer.
    #[inline(always)]
    pub fn max_queue_tx(&self) -> usize {
        self.max_queue_tx
    }

    /// For a server, require a client certificate.
    ///
    /// This will cause the server to send a CertificateRequest message.
    /// Makes the server fail if the client does not send a certificate.
    #[inline(always)]
    pub fn require_client_certificate(&self) -> bool {
        self.require_client_certificate
    }

    /// Time of first retry.
    ///
    /// Every flight restarts with this value.
    /// Doubled for every retry with a ±25% jitter.
    #[inline(always)]
    pub fn flight_start_rto(&self) -> Duration {
        self.flight_start_rto
    }

    /// Upper bound for the doubling retry timeout.
    #[inline(always)]
    pub fn flight_max_rto(&self) -> Duration {
        self.flight_max_rto
    }

    /// Max number of retries per flight.
    #[inline(always)]
    pub fn flight_retries(&self) -> usize {
        self.flight_retries
    }

    /// Timeout for the entire handshake, regardless of flights.
    #[inline(always)]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Connections without traffic for this long are dropped by the endpoint.
    #[inline(always)]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Cipher suites in order of preference.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }

    /// Curve ids usable for ECDHE, in order of preference.
    #[inline(always)]
    pub fn named_curves(&self) -> &[u16] {
        &self.named_curves
    }

    /// For a server, answer the first ClientHello with a HelloVerifyRequest.
    #[inline(always)]
    pub fn cookie_exchange(&self) -> bool {
        self.cookie_exchange
    }

    /// For a client, accept a ServerKeyExchange without signature.
    #[inline(always)]
    pub fn allow_anonymous_key_exchange(&self) -> bool {
        self.allow_anonymous_key_exchange
    }

    /// For a server, how many sessions to remember for resumption.
    #[inline(always)]
    pub fn session_cache_size(&self) -> usize {
        self.session_cache_size
    }

    /// Seed for the non-cryptographic randomness (retransmission jitter).
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }

    /// Verifier for the peer certificate.
    #[inline(always)]
    pub fn cert_verifier(&self) -> Option<&Arc<dyn CertVerifier>> {
        self.cert_verifier.as_ref()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mtu", &self.mtu)
            .field("flight_start_rto", &self.flight_start_rto)
            .field("flight_retries", &self.flight_retries)
            .field("cipher_suites", &self.cipher_suites)
            .field("named_curves", &self.named_curves)
            .field("cookie_exchange", &self.cookie_exchange)
            .field("cert_verifier", &self.cert_verifier.is_some())
            .finish()
    }
}

/// Builder for DTLS configuration.
pub struct ConfigBuilder {
    mtu: usize,
    max_queue_rx: usize,
    max_queue_tx: usize,
    require_client_certificate: bool,
    flight_start_rto: Duration,
    flight_max_rto: Duration,
    flight_retries: usize,
    handshake_timeout: Duration,
    idle_timeout: Duration,
    cipher_suites: Vec<CipherSuite>,
    named_curves: Vec<u16>,
    cookie_exchange: bool,
    allow_anonymous_key_exchange: bool,
    session_cache_size: usize,
    rng_seed: Option<u64>,
    cert_verifier: Option<Arc<dyn CertVerifier>>,
}

impl ConfigBuilder {
    /// Set the max transmission unit (MTU).
    ///
    /// The largest size UDP packets we will produce.
    /// Defaults to 1150.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the max amount of incoming records to buffer.
    ///
    /// Defaults to 30.
    pub fn max_queue_rx(mut self, max_queue_rx: usize) -> Self {
        self.max_queue_rx = max_queue_rx;
        self
    }

    /// Set the max amount of outgoing packets to buffer.
    ///
    /// Defaults to 10.
    pub fn max_queue_tx(mut self, max_queue_tx: usize) -> Self {
        self.max_queue_tx = max_queue_tx;
        self
    }

    /// Set whether to require a client certificate (for servers).
    ///
    /// Defaults to false.
    pub fn require_client_certificate(mut self, require: bool) -> Self {
        self.require_client_certificate = require;
        self
    }

    /// Set the time of first retry.
    ///
    /// Defaults to 1 second.
    pub fn flight_start_rto(mut self, rto: Duration) -> Self {
        self.flight_start_rto = rto;
        self
    }

    /// Set the cap of the retry timeout.
    ///
    /// Defaults to 60 seconds.
    pub fn flight_max_rto(mut self, rto: Duration) -> Self {
        self.flight_max_rto = rto;
        self
    }

    /// Set the max number of retries per flight.
    ///
    /// Defaults to 4.
    pub fn flight_retries(mut self, retries: usize) -> Self {
        self.flight_retries = retries;
        self
    }

    /// Set the timeout for the entire handshake, regardless of flights.
    ///
    /// Defaults to 40 seconds.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the idle timeout of endpoint connections.
    ///
    /// Defaults to 10 minutes.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the offered/accepted cipher suites, most preferred first.
    ///
    /// Defaults to AES-128-GCM-SHA256 followed by AES-256-GCM-SHA384.
    pub fn cipher_suites(mut self, suites: impl IntoIterator<Item = CipherSuite>) -> Self {
        self.cipher_suites = suites.into_iter().collect();
        self
    }

    /// Set the ECDHE curves by registry id, most preferred first.
    ///
    /// Defaults to secp256r1 followed by secp384r1.
    pub fn named_curves(mut self, curves: impl IntoIterator<Item = u16>) -> Self {
        self.named_curves = curves.into_iter().collect();
        self
    }

    /// Set whether a server performs the HelloVerifyRequest cookie exchange.
    ///
    /// Defaults to true.
    pub fn cookie_exchange(mut self, enabled: bool) -> Self {
        self.cookie_exchange = enabled;
        self
    }

    /// Set whether a client accepts an unsigned ServerKeyExchange.
    ///
    /// Defaults to false.
    pub fn allow_anonymous_key_exchange(mut self, allow: bool) -> Self {
        self.allow_anonymous_key_exchange = allow;
        self
    }

    /// Set the number of sessions a server keeps for resumption. 0 disables it.
    ///
    /// Defaults to 64.
    pub fn session_cache_size(mut self, size: usize) -> Self {
        self.session_cache_size = size;
        self
    }

    /// Make retransmission jitter deterministic.
    ///
    /// Defaults to None.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Verify peer certificates with `verifier`.
    ///
    /// Without a verifier any certificate is accepted and handed to the
    /// application via `Output::PeerCert`.
    pub fn cert_verifier(mut self, verifier: Arc<dyn CertVerifier>) -> Self {
        self.cert_verifier = Some(verifier);
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::ConfigError` for settings the handshake can not work with.
    pub fn build(self) -> Result<Config, Error> {
        if self.mtu < 256 {
            return Err(Error::ConfigError(format!("MTU too small: {}", self.mtu)));
        }
        if self.cipher_suites.is_empty() {
            return Err(Error::ConfigError("No cipher suites".into()));
        }
        if let Some(s) = self.cipher_suites.iter().find(|s| !s.is_supported()) {
            return Err(Error::ConfigError(format!("Unsupported cipher suite {:?}", s)));
        }
        if self.named_curves.is_empty() {
            return Err(Error::ConfigError("No named curves".into()));
        }
        for id in &self.named_curves {
            let name = curve::lookup_by_id(*id).map(|c| c.name()).unwrap_or("unknown");
            if !key_exchange::is_supported(*id) {
                return Err(Error::ConfigError(format!(
                    "Curve {} ({}) can not be used for ECDHE",
                    id, name
                )));
            }
        }
        if self.flight_retries == 0 {
            return Err(Error::ConfigError("flight_retries must be > 0".into()));
        }
        if self.flight_max_rto < self.flight_start_rto {
            return Err(Error::ConfigError(
                "flight_max_rto is smaller than flight_start_rto".into(),
            ));
        }

        Ok(Config {
            mtu: self.mtu,
            max_queue_rx: self.max_queue_rx,
            max_queue_tx: self.max_queue_tx,
            require_client_certificate: self.require_client_certificate,
            flight_start_rto: self.flight_start_rto,
            flight_max_rto: self.flight_max_rto,
            flight_retries: self.flight_retries,
            handshake_timeout: self.handshake_timeout,
            idle_timeout: self.idle_timeout,
            cipher_suites: self.cipher_suites,
            named_curves: self.named_curves,
            cookie_exchange: self.cookie_exchange,
            allow_anonymous_key_exchange: self.allow_anonymous_key_exchange,
            session_cache_size: self.session_cache_size,
            rng_seed: self.rng_seed,
            cert_verifier: self.cert_verifier,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder()
            .build()
            .expect("Default config should always validate")
    }
}
