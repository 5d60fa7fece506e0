//! Small message board served over HTTP.
//!
//! ```text
//! RESTFUL_BIND=127.0.0.1:3000 cargo run --bin messages-demo
//! curl -X POST localhost:3000/messages -H 'content-type: application/json' -d '{"text":"hi"}'
//! ```

use parking_lot::RwLock;
use restful::api::*;
use restful::response::create_response;
use restful_engine::{init_logging, EngineConfig, HttpEngine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
struct Message {
    id: u64,
    text: String,
}

#[derive(Deserialize)]
struct NewMessage {
    text: String,
}

#[derive(Default)]
struct MessageStore {
    messages: RwLock<BTreeMap<u64, Message>>,
}

impl MessageStore {
    fn insert(&self, text: String) -> Message {
        let mut messages = self.messages.write();
        let id = messages.keys().next_back().map_or(1, |last| last + 1);
        let message = Message { id, text };
        messages.insert(id, message.clone());
        message
    }

    fn get(&self, id: u64) -> Option<Message> {
        self.messages.read().get(&id).cloned()
    }

    fn list(&self, limit: usize) -> Vec<Message> {
        self.messages.read().values().take(limit).cloned().collect()
    }

    fn remove(&self, id: u64) -> bool {
        self.messages.write().remove(&id).is_some()
    }
}

struct Messages {
    store: Arc<MessageStore>,
}

impl Messages {
    fn find(&self, args: &RequestArgs<'_>) -> Result<Message, HandlerError> {
        let id: u64 = args.path_as("id")?;
        self.store
            .get(id)
            .ok_or_else(|| HandlerError::not_found(format!("message {} not found", id)))
    }
}

fn application() -> Result<Dispatcher, StartupError> {
    let mut builder = Application::builder();
    builder
        .singleton::<MessageStore>(Provider::from_fn(MessageStore::default))?
        .request_scoped::<Messages>(
            Provider::new(|deps| {
                Ok(Messages {
                    store: deps.get()?,
                })
            })
            .depends_on::<MessageStore>(),
        )?
        .resource(
            Resource::<Messages>::new("/messages")
                .get("", |messages, args| {
                    let limit = args.query_as::<usize>("limit")?.unwrap_or(50);
                    Reply::json(&messages.store.list(limit))
                })
                .param(ParamSpec::query("limit").optional())
                .post("", |messages, args| {
                    let new: NewMessage = args.json()?;
                    let message = messages.store.insert(new.text);
                    log::info!("request {} created message {}", args.request_id(), message.id);
                    let body = serde_json::to_value(&message).map_err(HandlerError::failed)?;
                    Ok(Reply::Response(
                        create_response(201, ResponseBody::Json(body))
                            .with_header("Location", format!("/messages/{}", message.id)),
                    ))
                })
                .param(ParamSpec::body())
                .get(r"/{id:\d+}", |messages, args| Reply::json(&messages.find(args)?))
                .get(r"/{id:\d+}/text", |messages, args| {
                    Ok(Reply::text(messages.find(args)?.text))
                })
                .produces("text/plain")
                .delete(r"/{id:\d+}", |messages, args| {
                    let id: u64 = args.path_as("id")?;
                    if messages.store.remove(id) {
                        Ok(Reply::Empty)
                    } else {
                        Err(HandlerError::not_found(format!("message {} not found", id)))
                    }
                }),
        )?;
    builder.build()
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = EngineConfig::from_env()?;
    init_logging(&config);

    let mut engine = HttpEngine::new(application()?, config);
    let addr = engine.serve()?;
    log::info!("messages demo ready on http://{}/messages, ctrl-c to stop", addr);

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(tokio::signal::ctrl_c())?;

    engine.shutdown();
    Ok(())
}
