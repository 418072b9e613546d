use std::cell::OnceCell;
use std::rc::Rc;

use saslkit_core::SaslError;

use super::adapter::EngineNegotiator;
use super::engine::{code, Engine};

/// Owns the engine and its process wide initialization.
///
/// Client and server sides are each initialized at most once, the first time
/// a negotiator needs them. A failed initialization is remembered and every
/// later attempt fails the same way. The engine is torn down when the registry
/// and every negotiator it created are gone.
///
/// Negotiators are meant to be created and driven from one control thread,
/// hence no locking and no `Send`.
pub struct EngineRegistry<E: Engine> {
    shared: Rc<Shared<E>>,
}

pub(crate) struct Shared<E: Engine> {
    pub(crate) engine: E,
    client_init: OnceCell<Result<(), SaslError>>,
    server_init: OnceCell<Result<(), SaslError>>,
}

impl<E: Engine> Shared<E> {
    fn init_result(side: &str, c: i32) -> Result<(), SaslError> {
        match c {
            code::OK => {
                tracing::info!(side, "SASL engine initialized");
                Ok(())
            }
            c => {
                tracing::error!(side, code = c, "SASL engine initialization failed");
                Err(SaslError::EngineInit { code: c })
            }
        }
    }

    pub(crate) fn ensure_client(&self) -> Result<(), SaslError> {
        self.client_init
            .get_or_init(|| Self::init_result("client", self.engine.client_init()))
            .clone()
    }

    pub(crate) fn ensure_server(&self, app_name: &str) -> Result<(), SaslError> {
        self.server_init
            .get_or_init(|| Self::init_result("server", self.engine.server_init(app_name)))
            .clone()
    }
}

impl<E: Engine> Drop for Shared<E> {
    fn drop(&mut self) {
        let initialized = [&self.client_init, &self.server_init]
            .iter()
            .any(|i| matches!(i.get(), Some(Ok(()))));
        if initialized {
            tracing::debug!("Tearing down SASL engine");
            self.engine.done();
        }
    }
}

impl<E: Engine> EngineRegistry<E> {
    pub fn new(engine: E) -> Self {
        Self {
            shared: Rc::new(Shared {
                engine,
                client_init: OnceCell::new(),
                server_init: OnceCell::new(),
            }),
        }
    }

    /// A fresh negotiator for one authentication attempt.
    pub fn negotiator(&self) -> EngineNegotiator<E> {
        EngineNegotiator::new(self.shared.clone())
    }

    pub fn engine(&self) -> &E {
        &self.shared.engine
    }
}
