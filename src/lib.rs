//! API Mock Server
//!
//! Serves canned HTTP responses from files on disk, driven by a JSON or
//! YAML configuration. Useful for front-end development and for testing
//! clients against services that are unavailable or not yet built.
//!
//! # Features
//!
//! - **Route Table**: Map service URLs and verbs to mock files or inline bodies
//! - **Switches**: Pick a response variant from a request parameter, a
//!   regular expression over the body, or a JSONPath query
//! - **Templates**: Substitute path parameters and switch values into bodies
//! - **JSONPath Responses**: Answer with a projection of a JSON document
//! - **Body Filters**: Only answer requests whose body (or its digest) matches
//! - **Latency Simulation**: Delay responses per route
//! - **Admin API**: Replace routes and reload the configuration at runtime
//!
//! # Example Configuration
//!
//! ```yaml
//! mockDirectory: ./mocks/
//! port: 8888
//! webServices:
//!   first:
//!     mockFile: king.json
//!     verbs: [get]
//!   nested/ace:
//!     mockFile: ace.json
//!     verbs: [get, post]
//!     switch: customerId
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod jsonpath;
pub mod matcher;
pub mod proxy;
pub mod request;
pub mod resolver;
pub mod response;
pub mod routes;
pub mod server;
pub mod store;
pub mod switch;
pub mod template;

pub use config::{ConfigLayer, MockServerConfig};
pub use error::{ConfigError, ResolveError};
pub use request::MockRequest;
pub use resolver::ResponseResolver;
pub use response::ResponsePlan;
pub use routes::{RouteDefinition, RouteTable, Verb};
pub use server::MockServer;
