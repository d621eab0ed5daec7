use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pingscope_core::extension::{
    ExtensionInformation, ExtensionMain, ExtensionServices, ExtensionStartInput,
    ExtensionStartOutput, ExtensionStopInput, ExtensionStopOutput,
};
use pingscope_core::initializer::InitializerInput;
use pingscope_core::interceptor::ClientInformation;
use pingscope_core::{panic_message, ClientId, ConnectionId, SessionSnapshot};
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::config::HostConfig;
use crate::connection::{Connection, ConnectionContext};
use crate::error::HostError;
use crate::initializers::Initializers;
use crate::sessions::SessionStore;

/// Outcome of loading an extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtensionState {
    Started,
    /// The extension asked not to be started.
    Prevented(String),
    /// `extension_start` panicked.
    Failed(String),
}

struct LoadedExtension {
    information: ExtensionInformation,
    main: Arc<dyn ExtensionMain>,
}

enum ExtensionSlot {
    /// Id reserved while `extension_start` runs.
    Starting,
    Loaded(LoadedExtension),
}

/// In-process broker host: owns sessions, connections and extensions.
pub struct Host {
    config: HostConfig,
    sessions: Arc<SessionStore>,
    initializers: Arc<Initializers>,
    connections: DashMap<ClientId, Arc<Connection>>,
    extensions: DashMap<String, ExtensionSlot>,
    runtime: Handle,
}

impl Host {
    pub fn new(config: HostConfig, runtime: Handle) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(config.lookup_latency)),
            initializers: Arc::new(Initializers::new()),
            connections: DashMap::new(),
            extensions: DashMap::new(),
            config,
            runtime,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn initializers(&self) -> &Arc<Initializers> {
        &self.initializers
    }

    /// Services handed to extensions on start.
    pub fn services(&self) -> ExtensionServices {
        ExtensionServices {
            client_service: self.sessions.clone(),
            initializer_registry: self.initializers.clone(),
            runtime: self.runtime.clone(),
        }
    }

    /// Start an extension. A panicking or self-preventing extension is not
    /// kept, and anything it registered is removed; the host keeps running.
    pub fn load_extension(
        &self,
        information: ExtensionInformation,
        main: Arc<dyn ExtensionMain>,
    ) -> Result<ExtensionState, HostError> {
        match self.extensions.entry(information.id.clone()) {
            Entry::Occupied(_) => return Err(HostError::ExtensionAlreadyLoaded(information.id)),
            Entry::Vacant(slot) => {
                slot.insert(ExtensionSlot::Starting);
            }
        }

        let input = ExtensionStartInput {
            extension_information: information.clone(),
            services: self.services(),
        };
        let mut output = ExtensionStartOutput::default();
        let started = catch_unwind(AssertUnwindSafe(|| main.extension_start(&input, &mut output)));

        let state = match started {
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(extension = %information.id, panic = %message, "extension start panicked");
                ExtensionState::Failed(message)
            }
            Ok(()) => match output.prevent_reason() {
                Some(reason) => {
                    warn!(extension = %information.id, reason, "extension prevented its startup");
                    ExtensionState::Prevented(reason.to_string())
                }
                None => ExtensionState::Started,
            },
        };

        if state == ExtensionState::Started {
            info!(extension = %information.id, version = %information.version, "extension loaded");
            self.extensions.insert(
                information.id.clone(),
                ExtensionSlot::Loaded(LoadedExtension { information, main }),
            );
        } else {
            self.extensions.remove(&information.id);
            self.initializers.clear_owner(&information.id);
        }
        Ok(state)
    }

    /// Stop a loaded extension and drop its client initializer. Connections
    /// that were already initialized keep their interceptors.
    pub fn stop_extension(&self, id: &str) -> Result<(), HostError> {
        let Some((_, ExtensionSlot::Loaded(loaded))) = self
            .extensions
            .remove_if(id, |_, slot| matches!(slot, ExtensionSlot::Loaded(_)))
        else {
            return Err(HostError::UnknownExtension(id.to_string()));
        };
        self.initializers.clear_owner(id);

        let input = ExtensionStopInput {
            extension_information: loaded.information,
        };
        let mut output = ExtensionStopOutput;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| {
            loaded.main.extension_stop(&input, &mut output);
        })) {
            error!(extension = %id, panic = %panic_message(panic.as_ref()), "extension stop panicked");
        }
        Ok(())
    }

    pub fn extension_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .extensions
            .iter()
            .filter(|e| matches!(e.value(), ExtensionSlot::Loaded(_)))
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Open a connection for `client_id` and run the client initializer on
    /// it. An existing connection of the same client is taken over.
    pub fn connect(
        &self,
        client_id: ClientId,
        session_expiry_interval: u64,
    ) -> Result<Arc<Connection>, HostError> {
        if !self.connections.contains_key(&client_id)
            && self.connections.len() >= self.config.max_connections
        {
            return Err(HostError::ConnectionLimit(self.config.max_connections));
        }

        self.sessions.upsert(SessionSnapshot::new(
            client_id.clone(),
            true,
            session_expiry_interval,
        ));

        let mut context = ConnectionContext::new();
        let connection_id = ConnectionId::generate();
        if let Some(initializer) = self.initializers.client_initializer() {
            let input = InitializerInput {
                client_information: ClientInformation::new(client_id.clone()),
                connection_id: connection_id.clone(),
            };
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| {
                initializer.initialize(&input, &mut context);
            })) {
                error!(
                    client_id = %client_id,
                    panic = %panic_message(panic.as_ref()),
                    "client initializer panicked"
                );
            }
        }

        let connection = Arc::new(Connection::new(
            connection_id,
            client_id.clone(),
            session_expiry_interval,
            context,
        ));
        if let Some(previous) = self.connections.insert(client_id.clone(), Arc::clone(&connection)) {
            previous.close();
            info!(client_id = %client_id, "previous connection taken over");
        }
        Ok(connection)
    }

    /// Close the client's connection. A zero expiry interval ends the
    /// session with the connection; otherwise it is kept as disconnected.
    pub fn disconnect(&self, client_id: &ClientId) -> bool {
        let Some((_, connection)) = self.connections.remove(client_id) else {
            return false;
        };
        connection.close();
        if connection.session_expiry_interval() == 0 {
            self.sessions.remove(client_id);
        } else {
            self.sessions.mark_disconnected(client_id);
        }
        true
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Stop all extensions, refuse new registrations, close connections.
    pub fn shutdown(&self) {
        for id in self.extension_ids() {
            let _ = self.stop_extension(&id);
        }
        self.initializers.close();
        let clients: Vec<ClientId> = self.connections.iter().map(|c| c.key().clone()).collect();
        for client_id in clients {
            self.disconnect(&client_id);
        }
        info!("host shut down");
    }
}
