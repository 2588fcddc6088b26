//! Data controllers.
//!
//! `core.data` exposes the data action of any handler as JSON under
//! `/_core/data/:handler`; `core.flash` is a data action returning the
//! pending flash messages of the session.

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::error::WebError;
use crate::http::action::Action;
use crate::http::{BoxReply, Context, Request, Responder};
use crate::routing::{Params, RouterError};

/// Flash categories returned by [`flash_messages`], in order.
pub const FLASH_CATEGORIES: [&str; 3] = ["error", "warning", "info"];

#[derive(Debug, Clone, Serialize)]
pub struct FlashMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: Value,
}

/// Serves the data action named by the `handler` param as JSON.
#[derive(Clone)]
pub struct DataController {
    responder: Responder,
}

impl DataController {
    pub fn new(responder: Responder) -> Self {
        Self { responder }
    }

    async fn get(self, ctx: Context, req: Request) -> BoxReply {
        let Some(handler) = req.param("handler").map(String::from) else {
            return Box::new(self.responder.not_found(&WebError::msg("no data handler given")));
        };
        let Some(router) = ctx.router().cloned() else {
            return Box::new(self.responder.server_error(&WebError::msg("no router in context")));
        };

        match router.data(&ctx, &req, &handler, Params::new()).await {
            Ok(data) => Box::new(self.responder.data(data)),
            Err(err @ (RouterError::DataControllerNotFound(_) | RouterError::NotDataController(_))) => {
                Box::new(self.responder.not_found(&err.into()))
            }
            Err(err) => Box::new(self.responder.server_error(&err.into())),
        }
    }
}

impl Action for DataController {
    fn call(&self, ctx: Context, req: Request) -> BoxFuture<'static, BoxReply> {
        Box::pin(self.clone().get(ctx, req))
    }
}

/// Takes the session's error, warning and info flashes.
pub async fn flash_messages(_ctx: Context, req: Request, _params: Params) -> Value {
    let session = req.session();
    let messages: Vec<FlashMessage> = FLASH_CATEGORIES
        .iter()
        .flat_map(|category| {
            session
                .flashes(Some(category))
                .into_iter()
                .map(|message| FlashMessage {
                    kind: category.to_string(),
                    message,
                })
        })
        .collect();
    serde_json::to_value(messages).unwrap_or(Value::Null)
}
