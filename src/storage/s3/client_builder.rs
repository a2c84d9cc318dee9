use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::retry::RetryConfig;
use aws_config::stalled_stream_protection::StalledStreamProtectionConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, ConfigLoader};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use std::time::Duration;

use crate::config::ClientConfig;
use crate::types::S3Credentials;

const CREDENTIALS_PROVIDER_NAME: &str = "s3mig";

impl ClientConfig {
    /// Build an S3 client for one side of the migration.
    ///
    /// Loading does not contact the network; credentials are resolved lazily
    /// on the first request.
    pub async fn create_client(&self) -> Client {
        let sdk_config = self.load_sdk_config().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(self.force_path_style)
            .request_checksum_calculation(self.request_checksum_calculation.clone());

        if let Some(endpoint_url) = &self.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        Client::from_conf(builder.build())
    }

    async fn load_sdk_config(&self) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        loader = self.apply_credentials(loader);
        // Without an explicit region the default chain (env, profile) applies.
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        loader = loader.retry_config(self.build_retry_config());
        loader = loader.timeout_config(self.build_timeout_config());

        if self.disable_stalled_stream_protection {
            loader = loader.stalled_stream_protection(StalledStreamProtectionConfig::disabled());
        }

        loader.load().await
    }

    fn apply_credentials(&self, loader: ConfigLoader) -> ConfigLoader {
        let loader = match self.build_profile_files() {
            Some(profile_files) => loader.profile_files(profile_files),
            None => loader,
        };

        match &self.credential {
            S3Credentials::Credentials { access_keys } => {
                let credentials = Credentials::new(
                    access_keys.access_key.clone(),
                    access_keys.secret_access_key.clone(),
                    access_keys.session_token.clone(),
                    None,
                    CREDENTIALS_PROVIDER_NAME,
                );
                loader.credentials_provider(credentials)
            }
            S3Credentials::Profile(profile_name) => loader.profile_name(profile_name),
            S3Credentials::FromEnvironment => loader,
        }
    }

    fn build_profile_files(&self) -> Option<ProfileFiles> {
        let location = &self.client_config_location;
        if location.aws_config_file.is_none() && location.aws_shared_credentials_file.is_none() {
            return None;
        }

        let mut builder = ProfileFiles::builder();
        match &location.aws_config_file {
            Some(path) => builder = builder.with_file(ProfileFileKind::Config, path),
            None => builder = builder.include_default_config_file(true),
        }
        match &location.aws_shared_credentials_file {
            Some(path) => builder = builder.with_file(ProfileFileKind::Credentials, path),
            None => builder = builder.include_default_credentials_file(true),
        }

        Some(builder.build())
    }

    fn build_retry_config(&self) -> RetryConfig {
        RetryConfig::standard()
            .with_max_attempts(self.retry_config.aws_max_attempts)
            .with_initial_backoff(Duration::from_millis(
                self.retry_config.initial_backoff_milliseconds,
            ))
    }

    fn build_timeout_config(&self) -> TimeoutConfig {
        let timeouts = &self.cli_timeout_config;
        let mut builder = TimeoutConfig::builder();
        builder.set_operation_timeout(timeouts.operation_timeout_milliseconds.map(Duration::from_millis));
        builder.set_operation_attempt_timeout(
            timeouts
                .operation_attempt_timeout_milliseconds
                .map(Duration::from_millis),
        );
        builder.set_connect_timeout(timeouts.connect_timeout_milliseconds.map(Duration::from_millis));
        builder.set_read_timeout(timeouts.read_timeout_milliseconds.map(Duration::from_millis));
        builder.build()
    }
}
