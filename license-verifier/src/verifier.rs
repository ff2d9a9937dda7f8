//! One-shot and periodic license verification.
//!
//! A session connects to the platform and resolves the cluster UID once.
//! Each attempt then re-reads the license from its source and validates it.
//! Attempts never overlap: the periodic loop runs them one after another on a
//! single task. Any failure is handed to the [`FailureHandler`].

use crate::certificate::{validate_license, VerifiedLicense};
use crate::config::VerifierConfig;
use crate::error::{LicenseError, LicenseResult, PlatformError};
use crate::failure::FailureHandler;
use crate::platform::{ClusterPlatform, PlatformConnector};
use crate::shutdown::{ProcessExit, Shutdown, ShutdownListener};
use crate::source::{CredentialSource, LicenseFile};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// State of one verification session.
///
/// The platform client and cluster UID are resolved once; the license bytes
/// are overwritten on every attempt.
pub struct VerificationSession {
    cluster_uid: String,
    product_name: String,
    ca_cert: Vec<u8>,
    license: Vec<u8>,
    source: Arc<dyn CredentialSource>,
    platform: Option<Arc<dyn ClusterPlatform>>,
}

impl VerificationSession {
    /// Creates an unconnected session.
    #[must_use]
    pub fn new(config: &VerifierConfig, source: Arc<dyn CredentialSource>) -> Self {
        Self {
            cluster_uid: String::new(),
            product_name: config.product_name.clone(),
            ca_cert: config.ca_cert.clone().into_bytes(),
            license: Vec::new(),
            source,
            platform: None,
        }
    }

    /// The resolved cluster UID, empty until [`read_cluster_uid`](Self::read_cluster_uid).
    #[must_use]
    pub fn cluster_uid(&self) -> &str {
        &self.cluster_uid
    }

    /// The platform client, once connected.
    #[must_use]
    pub fn platform(&self) -> Option<&dyn ClusterPlatform> {
        self.platform.as_deref()
    }

    /// Builds the platform client.
    pub async fn create_client<C>(&mut self, connector: &C) -> LicenseResult<()>
    where
        C: PlatformConnector + ?Sized,
    {
        let platform = connector
            .connect()
            .await
            .map_err(LicenseError::ClientConstruction)?;
        self.platform = Some(platform);
        Ok(())
    }

    /// Resolves the cluster UID through the platform client.
    pub async fn read_cluster_uid(&mut self) -> LicenseResult<()> {
        let platform = self.platform.as_deref().ok_or_else(|| {
            LicenseError::ClientConstruction(PlatformError::Client("not connected".to_string()))
        })?;
        self.cluster_uid = platform
            .cluster_uid()
            .await
            .map_err(LicenseError::ClusterIdentity)?;
        Ok(())
    }

    /// Re-reads the license bytes from the source.
    pub async fn read_license(&mut self) -> LicenseResult<()> {
        self.license = self
            .source
            .read()
            .await
            .map_err(|source| LicenseError::ReadLicense {
                location: self.source.location(),
                source,
            })?;
        Ok(())
    }

    /// Validates the last license read.
    pub fn validate_license(&self) -> LicenseResult<VerifiedLicense> {
        validate_license(
            &self.license,
            &self.ca_cert,
            &self.cluster_uid,
            &self.product_name,
        )
    }

    /// One attempt: read, then validate.
    pub async fn verify(&mut self) -> LicenseResult<VerifiedLicense> {
        info!("Verifying license");
        self.read_license().await?;
        let verified = self.validate_license()?;
        info!(
            organizations = ?verified.organizations,
            not_after = verified.not_after,
            "Successfully verified license"
        );
        Ok(verified)
    }
}

/// Runs license verification for a protected process.
pub struct LicenseVerifier {
    config: VerifierConfig,
    source: Arc<dyn CredentialSource>,
    failure: FailureHandler,
}

impl LicenseVerifier {
    /// Creates a verifier reading from `config.license_file` that broadcasts
    /// on `shutdown` before exiting on failure.
    #[must_use]
    pub fn new(config: VerifierConfig, shutdown: Shutdown) -> Self {
        let source = Arc::new(LicenseFile::new(config.license_file.clone()));
        let failure = FailureHandler::new(shutdown, config.shutdown_grace());
        Self {
            config,
            source,
            failure,
        }
    }

    /// Reads the license from `source` instead of the configured file.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.source = source;
        self
    }

    /// Replaces the final exit step of the failure path.
    #[must_use]
    pub fn with_process_exit(mut self, exit: Arc<dyn ProcessExit>) -> Self {
        self.failure = self.failure.with_process_exit(exit);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verifies the license once.
    ///
    /// On failure the process is terminated; the error is only returned when
    /// the exit step returns.
    pub async fn verify_license<C>(&self, connector: &C) -> LicenseResult<()>
    where
        C: PlatformConnector + ?Sized,
    {
        if self.config.skip_license_verification() {
            info!("License enforcement disabled, skipping verification");
            return Ok(());
        }

        let mut session = VerificationSession::new(&self.config, self.source.clone());
        if let Err(err) = Self::prepare(&mut session, connector).await {
            return Err(self.failure.handle(session.platform(), err).await);
        }
        if let Err(err) = session.verify().await {
            return Err(self.failure.handle(session.platform(), err).await);
        }
        Ok(())
    }

    /// Verifies the license now and then once per interval until `stop`
    /// fires.
    ///
    /// `stop` is checked only between attempts. A failed attempt ends the
    /// loop through the failure path.
    pub async fn verify_license_periodically<C>(
        &self,
        connector: &C,
        mut stop: ShutdownListener,
    ) -> LicenseResult<()>
    where
        C: PlatformConnector + ?Sized,
    {
        if self.config.skip_license_verification() {
            info!("License enforcement disabled, skipping periodic verification");
            return Ok(());
        }

        let mut session = VerificationSession::new(&self.config, self.source.clone());
        if let Err(err) = Self::prepare(&mut session, connector).await {
            drop(stop);
            return Err(self.failure.handle(session.platform(), err).await);
        }

        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    info!("Periodic license verification stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            if let Err(err) = session.verify().await {
                // Release our listener so the shutdown drain does not wait on it.
                drop(stop);
                return Err(self.failure.handle(session.platform(), err).await);
            }
        }
    }

    async fn prepare<C>(session: &mut VerificationSession, connector: &C) -> LicenseResult<()>
    where
        C: PlatformConnector + ?Sized,
    {
        session.create_client(connector).await?;
        session.read_cluster_uid().await
    }
}
