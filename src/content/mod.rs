/*!
 * Content identity: keys, requester scopes and id resolution.
 */

pub mod key;
pub mod resolver;

pub use key::{ContentKey, MediaKind, RequesterScope};
pub use resolver::{ContentResolver, Resolution, StreamIdResolver};
