use docsync_core::error::{BackendError, BackendResult};

/// Base URLs of the three services a store talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub management: String,
    pub query: String,
    pub search: String,
}

impl Endpoints {
    /// Maps `couchbase://host[,host...][?params]` to plain HTTP ports and
    /// `couchbases://` to the TLS ports. Only the first host is used.
    pub fn parse(connection_string: &str) -> BackendResult<Self> {
        let (scheme, rest) = connection_string
            .split_once("://")
            .ok_or_else(|| unsupported(connection_string))?;
        let (http, ports) = match scheme {
            "couchbase" => ("http", [8091, 8093, 8094]),
            "couchbases" => ("https", [18091, 18093, 18094]),
            _ => return Err(unsupported(connection_string)),
        };
        let hosts = rest.split(['?', '/']).next().unwrap_or_default();
        let host = hosts.split(',').next().unwrap_or_default().trim();
        let host = strip_port(host);
        if host.is_empty() {
            return Err(unsupported(connection_string));
        }
        let [management, query, search] = ports.map(|port| format!("{http}://{host}:{port}"));
        Ok(Self { management, query, search })
    }

    pub fn pools(&self) -> String {
        format!("{}/pools/default", self.management)
    }

    pub fn bucket(&self, bucket: &str) -> String {
        format!("{}/pools/default/buckets/{bucket}", self.management)
    }

    pub fn scopes(&self, bucket: &str) -> String {
        format!("{}/scopes", self.bucket(bucket))
    }

    pub fn collections(&self, bucket: &str, scope: &str) -> String {
        format!("{}/{scope}/collections", self.scopes(bucket))
    }

    pub fn collection(&self, bucket: &str, scope: &str, collection: &str) -> String {
        format!("{}/{collection}", self.collections(bucket, scope))
    }

    pub fn query_service(&self) -> String {
        format!("{}/query/service", self.query)
    }

    /// Root of the index routes: cluster-wide, or bound to a scope.
    pub fn index_root(&self, scope: Option<(&str, &str)>) -> String {
        match scope {
            None => format!("{}/api/index", self.search),
            Some((bucket, scope)) => format!("{}/api/bucket/{bucket}/scope/{scope}/index", self.search),
        }
    }

    pub fn stats(&self, index_key: &str) -> String {
        format!("{}/api/nsstats/index/{index_key}", self.search)
    }
}

fn unsupported(connection_string: &str) -> BackendError {
    BackendError::Unexpected(format!("unsupported connection string: {connection_string}"))
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split_inclusive(']').next().unwrap_or(host);
    }
    host.split(':').next().unwrap_or(host)
}
