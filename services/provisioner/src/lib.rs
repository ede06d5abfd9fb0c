//! Trigger Provisioner
//!
//! CloudFormation custom resource that runs once when the stack is created:
//! it lets S3 invoke the tweet analyzer function and installs an
//! "object created" notification on the `raw/` prefix of the bucket.
//! Every request is answered by PUTting a response document to the
//! pre-signed URL CloudFormation supplies.

pub mod callback;
pub mod config;
pub mod event;
pub mod handler;
pub mod provisioner;
pub mod wiring;

pub use callback::{CallbackError, HttpResponseSender, ResponseSender};
pub use config::{ConfigError, ProvisionerConfig, TriggerTarget};
pub use event::{CallbackResponse, LifecycleEvent, RequestType, ResponseStatus};
pub use handler::function_handler;
pub use provisioner::{ProvisionError, TriggerProvisioner};
pub use wiring::{AwsBucketWiring, BucketWiring};
