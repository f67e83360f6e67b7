use super::data::{JobData, JobDataError};
use super::job::Job;
use super::jobs::*;
use std::collections::HashMap;
use tracing::{error, warn};

pub type JobFactory = fn(&JobData) -> Result<JobKind, JobDataError>;

fn factory_for<T: JobBody>(data: &JobData) -> Result<JobKind, JobDataError> {
    T::deserialize(data).map(Into::into)
}

/// Maps persisted type keys back to job kinds.
#[derive(Default)]
pub struct JobFactoryRegistry {
    factories: HashMap<&'static str, JobFactory>,
    /// Registration order, which is also the recovery order.
    type_keys: Vec<&'static str>,
}

impl JobFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing every built-in job kind.
    pub fn with_default_jobs() -> Self {
        let mut registry = Self::new();
        registry.register_job::<AttachmentUploadJob>();
        registry.register_job::<AttachmentDownloadJob>();
        registry.register_job::<MessageReceiveJob>();
        registry.register_job::<MessageSendJob>();
        registry.register_job::<NotifyPushServerJob>();
        registry.register_job::<BatchMessageReceiveJob>();
        registry.register_job::<GroupAvatarDownloadJob>();
        registry.register_job::<BackgroundGroupAddJob>();
        registry.register_job::<OpenGroupDeleteJob>();
        registry.register_job::<TrimThreadJob>();
        registry
    }

    pub fn register_job<T: JobBody>(&mut self) {
        self.register(T::TYPE_KEY, factory_for::<T>);
    }

    /// Registers `factory` for `type_key`, replacing any previous one.
    pub fn register(&mut self, type_key: &'static str, factory: JobFactory) {
        if self.factories.insert(type_key, factory).is_some() {
            warn!("Replacing job factory for type {}", type_key);
        } else {
            self.type_keys.push(type_key);
        }
    }

    pub fn is_registered(&self, type_key: &str) -> bool {
        self.factories.contains_key(type_key)
    }

    pub fn type_keys(&self) -> &[&'static str] {
        &self.type_keys
    }

    /// Rebuilds a job from its payload. The result has no id yet.
    ///
    /// Returns `None`, after logging, when the key is unknown or the payload
    /// does not match what the factory expects.
    pub fn instantiate(&self, type_key: &str, data: &JobData) -> Option<Job> {
        let Some(factory) = self.factories.get(type_key) else {
            warn!("No job factory registered for type {}", type_key);
            return None;
        };
        match factory(data) {
            Ok(kind) => Some(Job::new(kind)),
            Err(e) => {
                error!("Failed to rebuild job of type {}: {}", type_key, e);
                None
            }
        }
    }
}
