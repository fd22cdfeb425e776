//! Minimal wallet-side CLI exercising [`wc_engine::Client`] end to end:
//! pair with a URI, approve the first session proposal that arrives, echo
//! back any request, and exit on delete.
//!
//! For demonstration purposes only: a real wallet would prompt the user
//! before approving a proposal or a request instead of accepting the first
//! one seen.

use {
    anyhow::Result,
    clap::Parser,
    std::sync::Arc,
    tokio::sync::mpsc::{unbounded_channel, UnboundedSender},
    wc_engine::{
        client::Delegate,
        config::{ClientConfig, SecretApiKey},
        domain::AppMetadata,
        pairing::PairingSettled,
        rpc::SessionPropose,
        session::{SessionRequest, SessionSettled},
        Client,
    },
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pairing URI produced by the peer's `propose_pairing`.
    pairing_uri: String,

    /// Relay WebSocket address.
    #[arg(short, long, default_value = "wss://relay.walletconnect.com")]
    address: String,

    /// Relay project id, used as the bearer credential.
    #[arg(short, long, default_value = "3cbaa32f8fbf3cdcc87d27ca1fa68069")]
    project_id: String,
}

#[derive(Debug)]
enum Event {
    PairingSettled(PairingSettled),
    SessionProposal(SessionPropose),
    SessionSettled(SessionSettled),
    SessionRequest(SessionRequest),
    SessionDeleted,
}

struct ChannelDelegate {
    tx: UnboundedSender<Event>,
}

impl Delegate for ChannelDelegate {
    fn on_pairing_settled(&self, settled: &PairingSettled) {
        self.tx.send(Event::PairingSettled(settled.clone())).ok();
    }

    fn on_session_proposal(&self, _pairing_topic: &relay_rpc::domain::Topic, proposal: &SessionPropose) {
        self.tx.send(Event::SessionProposal(proposal.clone())).ok();
    }

    fn on_session_settled(&self, settled: &SessionSettled) {
        self.tx.send(Event::SessionSettled(settled.clone())).ok();
    }

    fn on_session_request(&self, request: &SessionRequest) {
        self.tx.send(Event::SessionRequest(request.clone())).ok();
    }

    fn on_session_deleted(&self, _topic: &relay_rpc::domain::Topic) {
        self.tx.send(Event::SessionDeleted).ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = wc_engine::logging::init();
    let args = Args::parse();

    let metadata = AppMetadata {
        name: "wc_engine example wallet".to_owned(),
        description: "Demonstrates wc_engine::Client against a live relay".to_owned(),
        url: "https://example.com".to_owned(),
        icons: vec![],
    };

    let (tx, mut rx) = unbounded_channel();
    let config = ClientConfig::new(SecretApiKey::new(args.project_id), metadata)
        .with_relay_address(args.address);
    let client = Client::with_delegate(config, Arc::new(ChannelDelegate { tx }));

    client.connect().await?;
    println!("connected, pairing...");

    let settled = client.pair(&args.pairing_uri).await?;
    println!("pairing settled: topic={}", settled.settled_topic);

    while let Some(event) = rx.recv().await {
        match event {
            Event::PairingSettled(_) => {}
            Event::SessionProposal(proposal) => {
                println!("session proposed: topic={}", proposal.topic);
                let settled = client
                    .approve_session(&proposal, vec!["eip155:1:0xBA5BA3955463ADcc7aa3E33bbdfb8A68e0933dD8".to_owned()])
                    .await?;
                println!("session approved: topic={}", settled.topic);
            }
            Event::SessionSettled(settled) => {
                println!("session settled: topic={} accounts={:?}", settled.topic, settled.accounts);
            }
            Event::SessionRequest(request) => {
                println!("session request: method={} params={}", request.method, request.params);
                client.respond(&request, Ok(serde_json::json!(true))).await?;
            }
            Event::SessionDeleted => {
                println!("session deleted, exiting");
                break;
            }
        }
    }

    client.disconnect().await?;
    Ok(())
}
