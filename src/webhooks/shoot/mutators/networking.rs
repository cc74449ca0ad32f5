use ipnet::IpNet;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};

use crate::resources::seeds::Seed;
use crate::resources::shoots::{IpFamily, Networking, ShootSpec};

/// Services range used for workerless IPv6 Shoots when no random ULA prefix can be generated.
pub const FALLBACK_ULA_SERVICES_CIDR: &str = "fd00:10:2::/112";

/// Fills unset pod and service networks. Values set by the user are never replaced.
pub fn default_networks(spec: &mut ShootSpec, seed: Option<&Seed>) {
    default_networks_with(spec, seed, random_ula_global_id)
}

fn default_networks_with(
    spec: &mut ShootSpec,
    seed: Option<&Seed>,
    ula_global_id: impl FnOnce() -> Option<[u8; 5]>,
) {
    let families = spec.ip_families();
    let workerless = spec.is_workerless();
    let shoot_defaults = seed.and_then(|s| s.spec.networks.shoot_defaults.as_ref());
    let current = spec.networking.as_ref();
    let pods_unset = current.map_or(true, |n| n.pods.is_none());
    let services_unset = current.map_or(true, |n| n.services.is_none());

    let mut pods = None;
    let mut services = None;
    if let Some(defaults) = shoot_defaults {
        if pods_unset && !workerless {
            pods = defaults
                .pods
                .clone()
                .filter(|cidr| matches_ip_families(cidr, &families));
            if let Some(pods) = &pods {
                debug!(pods = %pods, "Defaulted pod network from seed");
            }
        }

        if services_unset {
            services = defaults
                .services
                .clone()
                .filter(|cidr| matches_ip_families(cidr, &families));
            if let Some(services) = &services {
                debug!(services = %services, "Defaulted service network from seed");
            }
        }
    }

    if services_unset && services.is_none() && workerless && families.contains(&IpFamily::IPv6) {
        let generated = match ula_global_id() {
            Some(global_id) => ula_services_cidr(global_id),
            None => {
                warn!("Could not generate a random ULA prefix, using {FALLBACK_ULA_SERVICES_CIDR}");
                FALLBACK_ULA_SERVICES_CIDR.to_string()
            }
        };
        debug!(services = %generated, "Generated service network for workerless IPv6 shoot");
        services = Some(generated);
    }

    if pods.is_none() && services.is_none() {
        return;
    }
    let networking = spec.networking.get_or_insert_with(Networking::default);
    if pods.is_some() {
        networking.pods = pods;
    }
    if services.is_some() {
        networking.services = services;
    }
}

/// Address family of a CIDR; IPv4-mapped IPv6 networks count as IPv4.
pub fn ip_family(cidr: &str) -> Option<IpFamily> {
    match cidr.parse::<IpNet>().ok()? {
        IpNet::V4(_) => Some(IpFamily::IPv4),
        IpNet::V6(net) if net.addr().to_ipv4_mapped().is_some() => Some(IpFamily::IPv4),
        IpNet::V6(_) => Some(IpFamily::IPv6),
    }
}

fn matches_ip_families(cidr: &str, families: &[IpFamily]) -> bool {
    ip_family(cidr).is_some_and(|family| families.contains(&family))
}

/// Formats a Unique Local Address /112 range from a 40 bit global ID.
pub fn ula_services_cidr(global_id: [u8; 5]) -> String {
    let [b0, b1, b2, b3, b4] = global_id;
    format!("fd{b0:02x}:{b1:02x}{b2:02x}:{b3:02x}{b4:02x}::/112")
}

fn random_ula_global_id() -> Option<[u8; 5]> {
    let mut global_id = [0u8; 5];
    match OsRng.try_fill_bytes(&mut global_id) {
        Ok(()) => Some(global_id),
        Err(e) => {
            warn!("Failed to read random bytes: {e}");
            None
        }
    }
}
