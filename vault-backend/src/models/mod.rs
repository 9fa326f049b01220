pub mod conversation;
pub mod credential;
pub mod payment;
pub mod provider;
pub mod session;

pub use conversation::{
    Client, Conversation, Message, MessageChannel, NewMessage, SendMessageRequest, SenderType,
};
pub use credential::{
    CredentialFields, CredentialLookup, CredentialMetadata, CredentialRecord,
    CredentialStatusResponse, SaveCredentialsRequest,
};
pub use payment::{CreatePaymentRequest, CreatePaymentResponse, Payment, PaymentStatus};
pub use provider::Provider;
pub use session::TenantSession;
