use chrono::{DateTime, Utc};
use tracing::debug;

use crate::catalog::Catalog;
use crate::resources::shoots::Shoot;
use crate::{Error, Result};

use mutators::kubernetes_version::default_kubernetes_versions;
use mutators::machine_image::default_machine_images;
use mutators::networking::default_networks;
use mutators::tasks::{add_tasks, set_created_by};

pub mod mutators;
pub mod webhook;

/// Runs every Shoot defaulting step against `shoot`.
///
/// `old` is the persisted Shoot on update. The first failing step aborts; callers must drop the
/// partially mutated object.
pub fn mutate_shoot(
    shoot: &mut Shoot,
    old: Option<&Shoot>,
    username: Option<&str>,
    catalog: &Catalog,
    now: DateTime<Utc>,
) -> Result<()> {
    let profile_name = shoot
        .spec
        .cloud_profile_name
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or(Error::MissingCloudProfileName)?;
    let profile = catalog
        .cloud_profiles
        .get(&profile_name)
        .ok_or(Error::CloudProfileNotFound(profile_name))?;
    let seed = match shoot.spec.seed_name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => Some(
            catalog
                .seeds
                .get(name)
                .ok_or_else(|| Error::SeedNotFound(name.to_string()))?,
        ),
        None => None,
    };

    default_kubernetes_versions(&mut shoot.spec, &profile.spec, now)?;
    default_machine_images(&mut shoot.spec, old.map(|o| &o.spec), &profile.spec, now)?;
    default_networks(&mut shoot.spec, seed.as_deref());
    add_tasks(shoot, old);

    if old.is_none() {
        if let Some(username) = username {
            set_created_by(shoot, username);
        }
    }
    debug!("Shoot defaulted");
    Ok(())
}
