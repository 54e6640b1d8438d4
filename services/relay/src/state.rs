use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::domain::codec::CodecRegistry;
use crate::domain::types::DispatchOptions;
use crate::infra::broker::InProcessBroker;
use crate::infra::db::DbOutboxStore;
use crate::infra::signer::HmacSigner;
use crate::infra::webhook::HttpWebhookTransport;
use crate::usecase::dispatch_outbox::DispatchPendingUseCase;
use crate::usecase::webhook::WebhookDispatcher;

/// Shared application state for the relay worker.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub broker: InProcessBroker,
    pub http: reqwest::Client,
    pub codecs: CodecRegistry,
    pub dispatch_options: DispatchOptions,
    /// Stable tag identifying this process in `claimed_by`.
    pub instance_id: String,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        codecs: CodecRegistry,
        dispatch_options: DispatchOptions,
    ) -> Self {
        Self {
            db,
            broker: InProcessBroker::new(),
            http: reqwest::Client::new(),
            codecs,
            dispatch_options,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn outbox_store(&self) -> DbOutboxStore {
        DbOutboxStore {
            db: self.db.clone(),
            instance_id: self.instance_id.clone(),
        }
    }

    pub fn dispatcher(&self) -> DispatchPendingUseCase<DbOutboxStore, InProcessBroker> {
        DispatchPendingUseCase {
            store: self.outbox_store(),
            publisher: self.broker.clone(),
            codecs: self.codecs.clone(),
            options: self.dispatch_options.clone(),
        }
    }

    pub fn webhook_dispatcher(&self) -> WebhookDispatcher<HttpWebhookTransport, HmacSigner> {
        WebhookDispatcher {
            transport: HttpWebhookTransport::new(self.http.clone()),
            signer: HmacSigner,
        }
    }
}
