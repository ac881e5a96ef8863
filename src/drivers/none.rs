//! Driver for hosts that already exist and are only addressed by URL.
//!
//! Nothing is provisioned: create and remove only touch the local record,
//! the machine is always reported as running, and power verbs are refused.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::base::BaseDriver;
use crate::driver::{Driver, DriverError, DriverFuture, MachineState, Operation, ready};
use crate::options::DriverOptions;
use crate::registry::DriverFactory;

/// Name under which the driver registers.
pub const DRIVER_NAME: &str = "none";

const URL_OPTION: &str = "url";

/// Driver for an existing host reached through `url`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NoneDriver {
    /// Shared attributes.
    #[serde(flatten)]
    pub base: BaseDriver,
    /// Engine endpoint, for example `tcp://10.0.0.5:2376`.
    #[serde(default, rename = "URL")]
    pub url: String,
}

impl NoneDriver {
    /// Creates an unconfigured driver for `machine_name`.
    #[must_use]
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base: BaseDriver::new(machine_name, store_path),
            url: String::new(),
        }
    }

    fn unsupported(operation: Operation) -> DriverError {
        DriverError::Unsupported {
            driver: DRIVER_NAME.to_owned(),
            operation,
        }
    }
}

impl Driver for NoneDriver {
    fn base(&self) -> &BaseDriver {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDriver {
        &mut self.base
    }

    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn reachable_over_ssh(&self) -> bool {
        false
    }

    fn set_config_from_options(&mut self, options: &dyn DriverOptions) -> Result<(), DriverError> {
        let url = options.string(URL_OPTION);
        if url.trim().is_empty() {
            return Err(DriverError::InvalidOption {
                key: URL_OPTION.to_owned(),
                message: String::from("required by the none driver"),
            });
        }
        self.base.ip_address = host_from_url(url.trim())?;
        self.url = url.trim().to_owned();
        Ok(())
    }

    fn to_record(&self) -> Result<serde_json::Value, DriverError> {
        Ok(serde_json::to_value(self)?)
    }

    fn create(&mut self) -> DriverFuture<'_, ()> {
        ready(Ok(()))
    }

    fn state(&mut self) -> DriverFuture<'_, MachineState> {
        ready(Ok(MachineState::Running))
    }

    fn start(&mut self) -> DriverFuture<'_, ()> {
        ready(Err(Self::unsupported(Operation::Start)))
    }

    fn stop(&mut self) -> DriverFuture<'_, ()> {
        ready(Err(Self::unsupported(Operation::Stop)))
    }

    fn restart(&mut self) -> DriverFuture<'_, ()> {
        ready(Err(Self::unsupported(Operation::Restart)))
    }

    fn kill(&mut self) -> DriverFuture<'_, ()> {
        ready(Err(Self::unsupported(Operation::Kill)))
    }

    fn remove(&mut self) -> DriverFuture<'_, ()> {
        ready(Ok(()))
    }
}

/// Factory registering [`NoneDriver`] under [`DRIVER_NAME`].
#[derive(Clone, Copy, Debug, Default)]
pub struct NoneDriverFactory;

impl DriverFactory for NoneDriverFactory {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn new_driver(&self, machine_name: &str, store_path: &Utf8Path) -> Box<dyn Driver> {
        Box::new(NoneDriver::new(machine_name, store_path))
    }

    fn restore(&self, record: serde_json::Value) -> Result<Box<dyn Driver>, DriverError> {
        let driver: NoneDriver = serde_json::from_value(record)?;
        Ok(Box::new(driver))
    }
}

/// Extracts the host from `scheme://host:port/path`, `host:port`, or a bare
/// host. IPv6 hosts must be bracketed when a port follows.
fn host_from_url(url: &str) -> Result<String, DriverError> {
    let invalid = |message: &str| DriverError::InvalidOption {
        key: URL_OPTION.to_owned(),
        message: format!("{message}: {url}"),
    };

    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let with_userinfo = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let authority = with_userinfo
        .rsplit_once('@')
        .map_or(with_userinfo, |(_, host)| host);

    let host = if let Some(bracketed) = authority.strip_prefix('[') {
        bracketed
            .split_once(']')
            .map(|(host, _)| host)
            .ok_or_else(|| invalid("unterminated IPv6 address"))?
    } else {
        // More than one colon without brackets is a bare IPv6 address.
        match authority.rsplit_once(':') {
            Some((host, port))
                if !host.contains(':') && port.chars().all(|ch| ch.is_ascii_digit()) =>
            {
                host
            }
            _ => authority,
        }
    };

    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    Ok(host.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionMap;
    use rstest::rstest;

    #[rstest]
    #[case::tcp("tcp://10.0.0.5:2376", "10.0.0.5")]
    #[case::no_scheme("10.0.0.5:2376", "10.0.0.5")]
    #[case::bare("docker.example.com", "docker.example.com")]
    #[case::path("https://docker.example.com:443/v1", "docker.example.com")]
    #[case::ipv6("tcp://[fd00::5]:2376", "fd00::5")]
    #[case::bare_ipv6("fd00::5", "fd00::5")]
    #[case::bare_ipv6_with_scheme("tcp://fd00::5", "fd00::5")]
    #[case::userinfo("ssh://core@10.0.0.7:22", "10.0.0.7")]
    fn host_is_extracted_from_url(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(host_from_url(url), Ok(expected.to_owned()));
    }

    #[rstest]
    #[case::empty_host("tcp://:2376")]
    #[case::open_bracket("tcp://[fd00::5")]
    fn malformed_urls_are_rejected(#[case] url: &str) {
        assert!(matches!(
            host_from_url(url),
            Err(DriverError::InvalidOption { .. })
        ));
    }

    #[test]
    fn options_set_url_and_address() {
        let mut driver = NoneDriver::new("m1", "/s");
        driver
            .set_config_from_options(&OptionMap::new().with("url", "tcp://10.0.0.5:2376"))
            .unwrap_or_else(|err| panic!("configure: {err}"));

        assert_eq!(driver.url, "tcp://10.0.0.5:2376");
        assert_eq!(driver.base.ip_address, "10.0.0.5");
    }

    #[test]
    fn url_is_required() {
        let mut driver = NoneDriver::new("m1", "/s");
        let err = driver
            .set_config_from_options(&OptionMap::new())
            .expect_err("url is required");
        assert!(err.to_string().contains("--url"));
    }

    #[tokio::test]
    async fn host_is_always_running_and_refuses_power_verbs() {
        let mut driver = NoneDriver::new("m1", "/s");

        assert_eq!(driver.state().await, Ok(MachineState::Running));
        assert_eq!(driver.create().await, Ok(()));
        assert_eq!(
            driver.stop().await,
            Err(DriverError::Unsupported {
                driver: String::from("none"),
                operation: Operation::Stop,
            })
        );
        assert_eq!(driver.remove().await, Ok(()));
    }

    #[test]
    fn hosts_are_not_managed_over_ssh() {
        let driver = NoneDriver::new("m1", "/s");
        assert!(!driver.reachable_over_ssh());
    }

    #[test]
    fn record_uses_flattened_base_fields() {
        let mut driver = NoneDriver::new("m1", "/s");
        driver.url = String::from("tcp://10.0.0.5:2376");
        driver.base.ip_address = String::from("10.0.0.5");

        let record = driver
            .to_record()
            .unwrap_or_else(|err| panic!("encode: {err}"));

        assert_eq!(record["MachineName"], "m1");
        assert_eq!(record["IPAddress"], "10.0.0.5");
        assert_eq!(record["URL"], "tcp://10.0.0.5:2376");
    }
}
