use std::net::SocketAddr;

use foreman::Configuration;

/// Builds a localhost address vector for `count` ranks starting at
/// `base_port`; the vector is indexed by rank.
#[allow(dead_code)]
pub fn local_addresses(base_port: u16, count: usize) -> Vec<SocketAddr> {
    (0..count)
        .map(|i| {
            format!("127.0.0.1:{}", base_port + i as u16)
                .parse()
                .expect("Unable to parse socket address")
        })
        .collect()
}

/// Builds the configuration for one rank of an in-process test job.
#[allow(dead_code)]
pub fn job_configuration(base_port: u16, count: usize, index: i32) -> Configuration {
    Configuration::new(index, local_addresses(base_port, count)).disable_logger()
}
