pub mod comment;
pub mod document;
pub mod feedback;
pub mod group;
pub mod subscription;
pub mod user;

pub use comment::{Comment, CommentParent};
pub use document::Document;
pub use feedback::Feedback;
pub use group::Group;
pub use subscription::{Plan, Subscription, SubscriptionStatus};
pub use user::User;
