//! Typed operations of the queue server.

use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;
use std::sync::Arc;

use magics_core::{DeviceKind, DeviceRef, PlanItem};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::api::{
    DeviceDescription, EnvironmentAction, HistoryItem, PauseMode, StatusSnapshot, endpoints,
};
use crate::error::{SessionError, TransportError};
use crate::session::SessionHandler;
use crate::transport::{ApiRequest, Transport};

const CLIENT_TARGET: &str = "magics::client";

/// Operations the console and monitor need from the queue server.
pub trait QueueService: Send + Sync {
    /// Current manager status.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the request fails.
    fn status(&self) -> Result<StatusSnapshot, SessionError>;

    /// Finished items, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the request fails.
    fn history(&self) -> Result<Vec<HistoryItem>, SessionError>;

    /// Queues `item` for immediate execution and returns its uid.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RemoteRejection`] when the server refuses
    /// the item.
    fn submit(&self, item: &PlanItem) -> Result<String, SessionError>;

    /// Requests a pause of the running plan.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the request fails.
    fn pause(&self, mode: PauseMode) -> Result<(), SessionError>;

    /// Resumes a paused plan.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the request fails.
    fn resume(&self) -> Result<(), SessionError>;

    /// Stops a paused plan.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the request fails.
    fn stop(&self) -> Result<(), SessionError>;

    /// Aborts a paused plan.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the request fails.
    fn abort(&self) -> Result<(), SessionError>;

    /// Removes a queued item.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the request fails.
    fn remove_item(&self, item_uid: &str) -> Result<(), SessionError>;

    /// Devices the user may reference.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the request fails.
    fn allowed_devices(&self) -> Result<Vec<DeviceRef>, SessionError>;

    /// Plans the user may submit.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the request fails.
    fn allowed_plans(&self) -> Result<BTreeSet<String>, SessionError>;

    /// Opens, closes or destroys the worker environment.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the request fails.
    fn environment(&self, action: EnvironmentAction) -> Result<(), SessionError>;

    /// Opens the status event stream.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the stream cannot be opened.
    fn status_stream(&self) -> Result<Box<dyn BufRead + Send>, SessionError>;
}

/// [`QueueService`] backed by a [`SessionHandler`].
#[derive(Debug)]
pub struct QueueClient<T: Transport> {
    session: Arc<SessionHandler<T>>,
}

impl<T: Transport> Clone for QueueClient<T> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
        }
    }
}

impl<T: Transport> QueueClient<T> {
    /// Wraps a shared session.
    #[must_use]
    pub const fn new(session: Arc<SessionHandler<T>>) -> Self {
        Self { session }
    }

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> &SessionHandler<T> {
        &self.session
    }

    fn fetch<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, SessionError> {
        let value = self.session.send(request)?;
        decode(value)
    }

    fn command(&self, request: ApiRequest) -> Result<(), SessionError> {
        let path = request.path().to_owned();
        self.session.send(request)?;
        debug!(target: CLIENT_TARGET, event = "command", path = %path, "command accepted");
        Ok(())
    }
}

impl<T: Transport> QueueService for QueueClient<T> {
    fn status(&self) -> Result<StatusSnapshot, SessionError> {
        self.fetch(ApiRequest::get(endpoints::STATUS))
    }

    fn history(&self) -> Result<Vec<HistoryItem>, SessionError> {
        let value = self.session.send(ApiRequest::get(endpoints::HISTORY))?;
        value
            .get("items")
            .map_or_else(|| Ok(Vec::new()), |items| decode(items.clone()))
    }

    fn submit(&self, item: &PlanItem) -> Result<String, SessionError> {
        let body = json!({ "item": item });
        let response = self
            .session
            .send(ApiRequest::post_json(endpoints::EXECUTE, body).without_replay())?;
        let item_uid = response
            .pointer("/item/item_uid")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SessionError::Protocol(TransportError::Decode {
                    message: String::from("submission response carries no item uid"),
                })
            })?
            .to_owned();
        debug!(
            target: CLIENT_TARGET,
            event = "submitted",
            plan = %item.name,
            item_uid = %item_uid,
            "plan queued"
        );
        Ok(item_uid)
    }

    fn pause(&self, mode: PauseMode) -> Result<(), SessionError> {
        self.command(ApiRequest::post_json(
            endpoints::RE_PAUSE,
            json!({ "option": mode.as_str() }),
        ))
    }

    fn resume(&self) -> Result<(), SessionError> {
        self.command(ApiRequest::post(endpoints::RE_RESUME))
    }

    fn stop(&self) -> Result<(), SessionError> {
        self.command(ApiRequest::post(endpoints::RE_STOP))
    }

    fn abort(&self) -> Result<(), SessionError> {
        self.command(ApiRequest::post(endpoints::RE_ABORT))
    }

    fn remove_item(&self, item_uid: &str) -> Result<(), SessionError> {
        self.command(ApiRequest::post_json(
            endpoints::QUEUE_ITEM_REMOVE,
            json!({ "uid": item_uid }),
        ))
    }

    fn allowed_devices(&self) -> Result<Vec<DeviceRef>, SessionError> {
        let value = self.session.send(ApiRequest::get(endpoints::DEVICES_ALLOWED))?;
        let described: BTreeMap<String, DeviceDescription> = value
            .get("devices_allowed")
            .map_or_else(|| Ok(BTreeMap::new()), |devices| decode(devices.clone()))?;
        Ok(described
            .into_iter()
            .map(|(name, description)| {
                DeviceRef::new(
                    name,
                    DeviceKind::from_capabilities(description.is_movable, description.is_readable),
                )
            })
            .collect())
    }

    fn allowed_plans(&self) -> Result<BTreeSet<String>, SessionError> {
        let value = self.session.send(ApiRequest::get(endpoints::PLANS_ALLOWED))?;
        Ok(value
            .get("plans_allowed")
            .and_then(Value::as_object)
            .map(|plans| plans.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn environment(&self, action: EnvironmentAction) -> Result<(), SessionError> {
        self.command(ApiRequest::post(action.endpoint()))
    }

    fn status_stream(&self) -> Result<Box<dyn BufRead + Send>, SessionError> {
        self.session
            .open_stream(ApiRequest::get(endpoints::STATUS_STREAM))
    }
}

fn decode<R: DeserializeOwned>(value: Value) -> Result<R, SessionError> {
    serde_json::from_value(value).map_err(|error| {
        SessionError::Protocol(TransportError::Decode {
            message: error.to_string(),
        })
    })
}
