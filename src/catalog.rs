use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::*;

use crate::resources::cloudprofiles::CloudProfile;
use crate::resources::controllerregistrations::ControllerRegistration;
use crate::resources::seeds::Seed;

/// Read-only lookup of cluster-scoped objects by name.
pub trait Lister<K>: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<K>>;

    fn list(&self) -> Vec<Arc<K>>;
}

impl<K> Lister<K> for Store<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn get(&self, name: &str) -> Option<Arc<K>> {
        Store::get(self, &ObjectRef::new(name))
    }

    fn list(&self) -> Vec<Arc<K>> {
        self.state()
    }
}

/// A fixed, in-memory set of objects.
#[derive(Clone)]
pub struct Snapshot<K> {
    objects: BTreeMap<String, Arc<K>>,
}

impl<K> Default for Snapshot<K> {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
        }
    }
}

impl<K: Resource> Snapshot<K> {
    pub fn new(objects: impl IntoIterator<Item = K>) -> Self {
        Self {
            objects: objects
                .into_iter()
                .map(|o| (o.name_any(), Arc::new(o)))
                .collect(),
        }
    }
}

impl<K: Send + Sync> Lister<K> for Snapshot<K> {
    fn get(&self, name: &str) -> Option<Arc<K>> {
        self.objects.get(name).cloned()
    }

    fn list(&self) -> Vec<Arc<K>> {
        self.objects.values().cloned().collect()
    }
}

/// Tracks whether the backing caches finished their initial sync.
#[derive(Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn ready() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn mark_ready(&self) {
        self.0.store(true, Ordering::Release)
    }
}

/// The listers consulted during admission.
#[derive(Clone)]
pub struct Catalog {
    pub cloud_profiles: Arc<dyn Lister<CloudProfile>>,
    pub seeds: Arc<dyn Lister<Seed>>,
    pub controller_registrations: Arc<dyn Lister<ControllerRegistration>>,
    pub readiness: Readiness,
}

impl Catalog {
    /// Start watch-backed caches for all listers.
    ///
    /// The watches are polled on background tasks; readiness flips once every store has
    /// received its initial listing.
    pub fn watch(client: Client) -> Self {
        let cloud_profiles = reflect(Api::<CloudProfile>::all(client.clone()));
        let seeds = reflect(Api::<Seed>::all(client.clone()));
        let controller_registrations = reflect(Api::<ControllerRegistration>::all(client));

        let readiness = Readiness::default();
        {
            let readiness = readiness.clone();
            let (cloud_profiles, seeds, controller_registrations) = (
                cloud_profiles.clone(),
                seeds.clone(),
                controller_registrations.clone(),
            );
            tokio::spawn(async move {
                let synced = futures::future::try_join3(
                    cloud_profiles.wait_until_ready(),
                    seeds.wait_until_ready(),
                    controller_registrations.wait_until_ready(),
                )
                .await;
                match synced {
                    Ok(_) => {
                        info!("Caches synced, ready to handle admission requests");
                        readiness.mark_ready();
                    }
                    Err(e) => error!("Cache writer dropped before initial sync: {e}"),
                }
            });
        }

        Self {
            cloud_profiles: Arc::new(cloud_profiles),
            seeds: Arc::new(seeds),
            controller_registrations: Arc::new(controller_registrations),
            readiness,
        }
    }
}

fn reflect<K>(api: Api<K>) -> Store<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + std::fmt::Debug + Send + Sync + 'static,
{
    let (store, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .touched_objects();
    tokio::spawn(async move {
        stream
            .for_each(|res| async move {
                if let Err(e) = res {
                    warn!("Watch error for {}: {e}", K::kind(&()));
                }
            })
            .await;
    });
    store
}
