/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls::ServerConfig;
use rustls::pki_types::ServerName;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::TlsConnector;

/// A byte stream a connection can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Transport for T {}

pub type BoxedTransport = Box<dyn Transport>;

/// Replaces the transport of a stream with a wrapped one, usually TLS.
///
/// The connection calls this after the negotiation agreed on the upgrade
/// and every queued write reached the old transport.
#[async_trait]
pub trait StreamUpgrade: Send + Sync {
    async fn upgrade(&self, transport: BoxedTransport) -> io::Result<BoxedTransport>;
}

/// Client side TLS with the webpki root certificates.
pub struct RustlsConnector {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl RustlsConnector {
    /// Creates a connector verifying the certificate of the given domain.
    pub fn new(domain: &str) -> io::Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self::with_config(Arc::new(config), domain)
    }

    pub fn with_config(config: Arc<ClientConfig>, domain: &str) -> io::Result<Self> {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        Ok(RustlsConnector {
            connector: TlsConnector::from(config),
            server_name,
        })
    }
}

#[async_trait]
impl StreamUpgrade for RustlsConnector {
    async fn upgrade(&self, transport: BoxedTransport) -> io::Result<BoxedTransport> {
        let stream = self
            .connector
            .connect(self.server_name.clone(), transport)
            .await?;
        Ok(Box::new(stream))
    }
}

/// Server side TLS.
pub struct RustlsAcceptor {
    acceptor: TlsAcceptor,
}

impl RustlsAcceptor {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        RustlsAcceptor {
            acceptor: TlsAcceptor::from(config),
        }
    }
}

#[async_trait]
impl StreamUpgrade for RustlsAcceptor {
    async fn upgrade(&self, transport: BoxedTransport) -> io::Result<BoxedTransport> {
        let stream = self.acceptor.accept(transport).await?;
        Ok(Box::new(stream))
    }
}
