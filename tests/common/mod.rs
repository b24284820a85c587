//! Mock discovery service shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

use cloudlet_discovery::client::StaticEnvironment;
use cloudlet_discovery::common::config::ClientConfig;
use cloudlet_discovery::common::connection::Connection;
use cloudlet_discovery::common::messages::{
    ApplicationContext, CarrierIdentity, CellTowerInfo, FindStatus, GpsLocationStatus, IdType,
    Message, TowerStatus, PROTOCOL_VERSION,
};

/// Reply after a delay, or `None` to hold the connection open without answering.
type Responder = dyn Fn(&Message) -> Option<(Duration, Message)> + Send + Sync;

/// A discovery service on an ephemeral localhost port, running on its own runtime.
pub struct MockDiscoveryService {
    runtime: Runtime,
    port: u16,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Message>>>,
}

impl MockDiscoveryService {
    pub fn start<F>(respond: F) -> Self
    where
        F: Fn(&Message) -> Option<(Duration, Message)> + Send + Sync + 'static,
    {
        let runtime = Runtime::new().unwrap();
        let listener = runtime.block_on(TcpListener::bind("127.0.0.1:0")).unwrap();
        let port = listener.local_addr().unwrap().port();

        let respond: Arc<Responder> = Arc::new(respond);
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        let accepted = connections.clone();
        let log = received.clone();
        runtime.spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                let respond = respond.clone();
                let log = log.clone();

                tokio::spawn(async move {
                    let mut conn = Connection::new(socket);
                    let Ok(Some(message)) = conn.read_message().await else {
                        return;
                    };
                    log.lock().unwrap().push(message.clone());

                    match respond(&message) {
                        Some((delay, reply)) => {
                            tokio::time::sleep(delay).await;
                            let _ = conn.write_message(&reply).await;
                        }
                        None => tokio::time::sleep(Duration::from_secs(30)).await,
                    }
                });
            }
        });

        Self {
            runtime,
            port,
            connections,
            received,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Message> {
        self.received.lock().unwrap().clone()
    }
}

pub fn found(server: &str, service: &str) -> Message {
    Message::CloudletReply {
        ver: PROTOCOL_VERSION,
        status: FindStatus::Found,
        server: server.to_string(),
        service: service.to_string(),
    }
}

pub fn verified(status: GpsLocationStatus) -> Message {
    Message::VerifyReply {
        ver: PROTOCOL_VERSION,
        tower_status: TowerStatus::ConnectedToSpecifiedTower,
        gps_location_status: status,
        gps_location_accuracy_km: 2.0,
    }
}

/// A localhost port with nothing listening on it.
pub fn refused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn config_for(port: u16, pool_size: usize) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.discovery.host = "127.0.0.1".to_string();
    config.discovery.port = port;
    config.executor.pool_size = pool_size;
    config
}

pub fn environment() -> Arc<StaticEnvironment> {
    Arc::new(StaticEnvironment::new(
        Some(CarrierIdentity {
            id_type: IdType::Msisdn,
            id: "14155550100".to_string(),
            mnc: "26".to_string(),
            mcc: "310".to_string(),
            operator_name: "T-Mobile".to_string(),
        }),
        vec![CellTowerInfo {
            cell_id: 4321,
            location_area_code: 17,
        }],
        ApplicationContext {
            label: "EmptyMatchEngineApp".to_string(),
            app_id: String::new(),
        },
    ))
}
