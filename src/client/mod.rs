//! Endpoint client: transport, body encoding and gated submission.

mod serializer;
mod submission;
mod transport;

pub use serializer::{JsonSerializer, Serializer};
pub use submission::SubmissionClient;
pub use transport::{HttpTransport, Transport};
