pub mod grant;
pub mod owner;
pub mod scope;
pub mod sync_run;
pub mod tag;
pub mod user;

pub use grant::Entity as Grant;
pub use owner::Entity as Owner;
pub use scope::Entity as Scope;
pub use sync_run::Entity as SyncRun;
pub use tag::Entity as Tag;
pub use user::Entity as User;
