use std::time::Duration;

pub enum Transport {
    Tcp,
}

/// Connection options for the MQTT transport
pub struct MqttOptions {
    pub broker_addr: String,
    pub port: u16,
    pub client_id: String,
    pub transport: Transport,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
}

impl MqttOptions {
    pub fn new<S: Into<String>, S1: Into<String>>(client_id: S, addr: S1, port: u16) -> Self {
        Self {
            broker_addr: addr.into(),
            port,
            client_id: client_id.into(),
            transport: Transport::Tcp,
            credentials: None,
            keep_alive: Duration::from_secs(30),
        }
    }

    pub fn with_credentials<S: Into<String>, S1: Into<String>>(mut self, username: S, password: S1) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

impl From<MqttOptions> for rumqttc::v5::MqttOptions {
    fn from(value: MqttOptions) -> Self {
        let mut options = rumqttc::v5::MqttOptions::new(value.client_id, value.broker_addr, value.port);
        options.set_keep_alive(value.keep_alive).set_clean_start(true);
        if let Some((username, password)) = value.credentials {
            options.set_credentials(username, password);
        }
        match value.transport {
            Transport::Tcp => (),
        }
        options
    }
}
