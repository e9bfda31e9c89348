use std::{
    fmt,
    net::{IpAddr, SocketAddr, ToSocketAddrs as _},
    slice,
    str::FromStr,
};

/// A `gmond` receiver.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Server {
    address: IpAddr,
    port: u16,
}

impl Server {
    /// Creates a new `Server` for the given address and port.
    pub const fn new(address: IpAddr, port: u16) -> Self {
        Server { address, port }
    }

    /// Resolves `addr`, in the form of `<host>:<port>`, to a `Server`.
    ///
    /// When the host resolves to multiple addresses, the first one is used.
    ///
    /// # Errors
    ///
    /// If the address cannot be parsed or resolved, an error describing the reason is returned.
    pub fn resolve(addr: &str) -> Result<Self, String> {
        addr.to_socket_addrs()
            .map_err(|e| e.to_string())?
            .next()
            .map(Server::from)
            .ok_or_else(|| format!("'{}' did not resolve to any address", addr))
    }

    /// Gets the address.
    pub const fn address(&self) -> IpAddr {
        self.address
    }

    /// Gets the port.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Gets the socket address.
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl From<SocketAddr> for Server {
    fn from(addr: SocketAddr) -> Self {
        Server::new(addr.ip(), addr.port())
    }
}

impl FromStr for Server {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>().map(Server::from).map_err(|e| format!("invalid server '{}': {}", s, e))
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.socket_addr(), f)
    }
}

/// Ordered set of servers that metrics are sent to.
///
/// Insertion order is preserved and duplicates are kept: adding the same server twice sends every metric to it twice.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerRegistry {
    servers: Vec<Server>,
}

impl ServerRegistry {
    /// Creates an empty `ServerRegistry`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a server.
    pub fn add(&mut self, server: Server) {
        self.servers.push(server);
    }

    /// Gets the servers, in insertion order.
    pub fn list(&self) -> &[Server] {
        &self.servers
    }

    /// Gets an iterator over the servers, in insertion order.
    pub fn iter(&self) -> slice::Iter<'_, Server> {
        self.servers.iter()
    }

    /// Gets the number of servers.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Returns `true` if there are no servers.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl FromIterator<Server> for ServerRegistry {
    fn from_iter<I: IntoIterator<Item = Server>>(iter: I) -> Self {
        ServerRegistry { servers: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a ServerRegistry {
    type Item = &'a Server;
    type IntoIter = slice::Iter<'a, Server>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use super::{Server, ServerRegistry};

    #[test]
    fn preserves_order_and_duplicates() {
        let a = Server::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 8649);
        let b = Server::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 8650);

        let mut registry = ServerRegistry::new();
        assert!(registry.is_empty());

        registry.add(a);
        registry.add(b);
        registry.add(a);

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.list(), &[a, b, a]);
        assert_eq!(registry.iter().copied().collect::<Vec<_>>(), vec![a, b, a]);
    }

    #[test]
    fn parse_and_display() {
        let server: Server = "127.0.0.1:8649".parse().unwrap();
        assert_eq!(server.address(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(server.port(), 8649);
        assert_eq!(server.to_string(), "127.0.0.1:8649");

        let server: Server = "[::1]:8649".parse().unwrap();
        assert_eq!(server.to_string(), "[::1]:8649");

        assert!("127.0.0.1".parse::<Server>().is_err());
        assert!("gmond:8649".parse::<Server>().is_err());
    }

    #[test]
    fn resolve_literal_address() {
        let server = Server::resolve("127.0.0.1:8649").unwrap();
        assert_eq!(server, Server::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8649));

        assert!(Server::resolve("not an address").is_err());
    }
}
