pub mod classifier;
pub mod conversation;
pub mod greeting;
pub mod naming;
pub mod request;
pub mod routing;
pub mod service;
pub mod transport;

pub use classifier::{ImageReply, UpstreamReply, classify_chat, classify_image};
pub use conversation::ConversationLog;
pub use request::{PreparedRequest, ProviderProfile, RequestBuilder};
pub use routing::{ModelClass, ModelFamily, Route, SamplingOverlay, classify_model};
pub use service::{AgentService, ChatHistory, CreateAgentRequest, UserAgents};
pub use transport::{HttpTransport, RawResponse, UpstreamTransport};
