use std::sync::Arc;

use tracing::info;

use crate::cascade::ShapeCascade;
use crate::catalog::CatalogService;
use crate::collection::CollectionService;
use crate::config::{SiteConfig, StoreBackend};
use crate::contact::ContactService;
use crate::error::Result;
use crate::gate::{AdminGate, IdentityResolver, NoSessions, SupabaseIdentity};
use crate::projects::ProjectService;
use crate::store::{MemoryObjects, MemoryStore, ObjectStore, PostgrestStore, SiteStore, SupabaseObjects};
use crate::upload::UploadBroker;
use crate::view::ViewBuilder;
use crate::Supabase;

/// Everything a request handler reaches for.
pub struct AppState {
    pub config: SiteConfig,
    pub store: Arc<dyn SiteStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub gate: AdminGate,
    pub projects: ProjectService,
    pub collections: CollectionService,
    pub uploads: UploadBroker,
    pub catalog: CatalogService,
    pub contact: ContactService,
}

impl AppState {
    /// Wire the backend named by `config.store_backend`.
    pub fn new(config: SiteConfig) -> Result<Arc<Self>> {
        let http = config.http_client()?;

        match config.store_backend {
            StoreBackend::Supabase => {
                info!(url = %config.supabase_url, bucket = %config.storage_bucket, "using Supabase backend");
                let supabase = Supabase::new(&config.supabase_url, &config.supabase_service_role_key, http.clone());
                let objects = SupabaseObjects::new(
                    supabase.storage(),
                    &config.storage_bucket,
                    config.public_base_url(),
                );
                let identity = SupabaseIdentity::new(
                    supabase.auth(&config.supabase_anon_key),
                    &config.supabase_url,
                    config.supabase_jwt_secret.as_deref(),
                );
                Ok(Self::assemble(
                    config,
                    Arc::new(PostgrestStore::new(supabase)),
                    Arc::new(objects),
                    Arc::new(identity),
                    http,
                ))
            }
            StoreBackend::Memory => {
                info!("using in-memory backend, nothing will be persisted");
                let objects = MemoryObjects::new(&config.storage_bucket, config.public_base_url());
                Ok(Self::assemble(
                    config,
                    Arc::new(MemoryStore::new()),
                    Arc::new(objects),
                    Arc::new(NoSessions),
                    http,
                ))
            }
        }
    }

    pub fn assemble(
        config: SiteConfig,
        store: Arc<dyn SiteStore>,
        objects: Arc<dyn ObjectStore>,
        identity: Arc<dyn IdentityResolver>,
        http: reqwest::Client,
    ) -> Arc<Self> {
        let gate = AdminGate::new(config.admin_api_token.clone(), identity, store.clone());
        let views = ViewBuilder::new(objects.clone(), config.maps_api_key.clone());
        let contact = ContactService::new(&config, http);

        Arc::new(Self {
            gate,
            projects: ProjectService::new(store.clone(), objects.clone()),
            collections: CollectionService::new(store.clone(), objects.clone()),
            uploads: UploadBroker::new(store.clone(), objects.clone()),
            catalog: CatalogService::new(store.clone(), ShapeCascade::default(), views),
            contact,
            store,
            objects,
            config,
        })
    }
}
