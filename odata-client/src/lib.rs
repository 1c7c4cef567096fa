//! OData v4 client
//!
//! Resources compose URLs and query options without touching the network;
//! the request pipeline turns them into calls through a pluggable
//! [`Transport`](transport::Transport); responses are parsed against a
//! [`Schema`](schema::Schema) and can be wrapped into tracked
//! [`Model`](models::Model)s and [`Collection`](models::Collection)s.
//!
//! ```no_run
//! use odata_client::{ODataApi, ODataResource, ODataSettings, RequestOptions};
//!
//! # async fn run() -> odata_client::ODataResult<()> {
//! let settings = ODataSettings::from_toml_file("odata.toml")?;
//! let api = ODataApi::builder(settings).build();
//! let schema = api.metadata().fetch_schema(RequestOptions::new()).await?;
//! let api = ODataApi::new(api.settings().clone(), schema);
//!
//! let page = api
//!     .entity_set("People")
//!     .filter("Age gt 30")
//!     .select(&["UserName", "FirstName"])
//!     .top(10)
//!     .fetch(RequestOptions::new())
//!     .await?;
//! println!("{} people", page.entities.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod constants;
pub mod error;
pub mod literal;
pub mod models;
pub mod path;
pub mod query;
pub mod request;
pub mod resource;
pub mod response;
pub mod schema;
pub mod settings;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{DirectRequester, ODataApi, ODataApiBuilder, ODataCall, Requester};
pub use error::{ODataError, ODataResult};
pub use literal::Literal;
pub use models::{AssignOptions, Collection, CollectionResource, Model, ModelCall};
pub use path::EntityKey;
pub use query::{FieldProxy, FilterExpression, QueryOptionName, QueryOptions};
pub use request::{ODataRequest, RequestBody, RequestOptions, ResponseType};
pub use resource::{
    ActionResource, BatchResource, CountResource, EntityResource, EntitySetResource,
    FunctionResource, MediaResource, MetadataResource, NavigationPropertyResource, ODataResource,
    PropertyResource, ReferenceResource, SingletonResource, ValueResource,
};
pub use response::{EntitiesResult, EntityResult, ODataResponse, PropertyResult};
pub use schema::{Schema, SchemaRegistry};
pub use settings::ODataSettings;
pub use transport::{ReqwestTransport, Transport};
