//! Two-peer demo: runs one full [`ShadowGraphSynchronizer`] exchange over
//! a real QUIC connection.
//!
//! QUIC setup (self-signed cert, `SkipServerVerification`, single-cert
//! server config) is carried over from the teacher's `network.rs`
//! verbatim — only the message layer changed, from a bincode-encoded
//! `ProtocolMessage` enum to the byte-framed reconciliation protocol in
//! `sync::wire`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use quinn::crypto::rustls::QuicClientConfig as QuinnRustlsClientConfig;
use quinn::{ClientConfig as QuinnClientConfig, Endpoint, ServerConfig};
use rcgen::generate_simple_self_signed;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, UnixTime};
use rustls::{
    ClientConfig as RustlsClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};

use shadowgraph_core::{
    Event, EventIntake, FallenBehindManager, GraphGenerations, ShadowGraph,
    ShadowGraphSynchronizer, SynchronizerConfig,
};

fn make_server_endpoint(addr: &str) -> Result<Endpoint> {
    let server_config = make_server_config()?;
    let addr: SocketAddr = addr.parse()?;
    let mut endpoint = Endpoint::server(server_config, addr)?;
    endpoint.set_default_client_config(make_insecure_client_config()?);
    Ok(endpoint)
}

fn make_client_endpoint(addr: &str) -> Result<Endpoint> {
    let addr: SocketAddr = addr.parse()?;
    let mut endpoint = Endpoint::client(addr)?;
    endpoint.set_default_client_config(make_insecure_client_config()?);
    Ok(endpoint)
}

/// Trusts any server certificate. This is a demo of the reconciliation
/// protocol over a real QUIC transport, not a TLS hardening exercise —
/// certificate verification belongs to the outer platform, not this crate.
fn make_insecure_client_config() -> Result<QuinnClientConfig> {
    let mut client_config = RustlsClientConfig::builder()
        .with_root_certificates(RootCertStore::empty())
        .with_no_client_auth();
    client_config
        .dangerous()
        .set_certificate_verifier(Arc::new(SkipServerVerification));

    let client_crypto = QuinnRustlsClientConfig::try_from(Arc::new(client_config))?;
    Ok(QuinnClientConfig::new(Arc::new(client_crypto)))
}

fn make_server_config() -> Result<ServerConfig> {
    let cert = generate_simple_self_signed(["localhost".to_string()])?;
    let cert_der: CertificateDer<'static> = cert.cert.der().clone();
    let key_der: PrivateKeyDer<'static> =
        PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der()).into();

    let mut server_config = quinn::ServerConfig::with_single_cert(vec![cert_der], key_der)?;
    let mut transport = quinn::TransportConfig::default();
    transport.keep_alive_interval(Some(Duration::from_secs(10)));
    server_config.transport_config(Arc::new(transport));

    Ok(server_config)
}

#[derive(Debug)]
struct SkipServerVerification;

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PKCS1_SHA256,
        ]
    }
}

fn build_graph_with_events(generations: std::ops::Range<i64>, creator_id: u32) -> Arc<ShadowGraph> {
    let graph = Arc::new(ShadowGraph::new());
    let mut parent = None;
    for generation in generations {
        let event = Event::new(parent, None, generation, creator_id, vec![]);
        parent = Some(event.base_hash);
        graph.add(event).expect("fresh events insert cleanly");
    }
    graph
}

fn logging_intake(label: &'static str) -> EventIntake {
    Arc::new(move |event: Event| {
        tracing::info!(
            label,
            generation = event.generation,
            creator = event.creator_id,
            "received event"
        );
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("installs the process-wide rustls crypto provider exactly once");

    let server_endpoint = make_server_endpoint("127.0.0.1:0")?;
    let server_addr = server_endpoint.local_addr()?;
    let client_endpoint = make_client_endpoint("127.0.0.1:0")?;

    // Node A has generations 0..10, node B has 5..15: they overlap from 5..9,
    // so this reproduces spec §8 scenario S1 (no fallen-behind, partial overlap).
    let graph_a = build_graph_with_events(0..10, 1);
    let graph_b = build_graph_with_events(5..15, 2);

    let synchronizer_a = ShadowGraphSynchronizer::new(
        graph_a.clone(),
        logging_intake("a"),
        SynchronizerConfig::default(),
    );
    let synchronizer_b = ShadowGraphSynchronizer::new(
        graph_b.clone(),
        logging_intake("b"),
        SynchronizerConfig::default(),
    );

    let generations_a = GraphGenerations::new(0, 3, 9)?;
    let generations_b = GraphGenerations::new(5, 8, 14)?;
    let fallen_behind_a = FallenBehindManager::new(0.34, 2);
    let fallen_behind_b = FallenBehindManager::new(0.34, 2);

    let peer_a = uuid::Uuid::new_v4();
    let peer_b = uuid::Uuid::new_v4();

    let server_task = tokio::spawn(async move {
        let incoming = server_endpoint.accept().await.expect("incoming connection");
        let connection = incoming.await.expect("handshake completes");
        let (send, recv) = connection.accept_bi().await.expect("bidi stream accepted");
        synchronizer_b
            .accept_sync(recv, send, peer_a, generations_b, &fallen_behind_b, true)
            .await
    });

    let connection = client_endpoint.connect(server_addr, "localhost")?.await?;
    let (send, recv) = connection.open_bi().await?;
    let client_outcome = synchronizer_a
        .initiate_sync(recv, send, peer_b, generations_a, &fallen_behind_a)
        .await?;

    let server_outcome = server_task.await.expect("server task joins")?;

    tracing::info!(?client_outcome, "node a finished sync");
    tracing::info!(?server_outcome, "node b finished sync");
    tracing::info!(
        tips_a = graph_a.get_tips().len(),
        tips_b = graph_b.get_tips().len(),
        "post-sync tip counts"
    );

    Ok(())
}
