use send_sms_module::{DeliveryReport, SmsGatewayClient};

/// Outbound SMS seam. Implementations never panic; a failed delivery is a
/// normal `DeliveryReport` with `delivered == false`.
pub trait SmsSender: Send + Sync {
    fn send(&self, phone_number: &str, message: &str) -> DeliveryReport;
}

#[derive(Debug, Clone)]
pub struct GatewaySender {
    client: SmsGatewayClient,
}

impl GatewaySender {
    pub fn new(client: SmsGatewayClient) -> Self {
        Self { client }
    }
}

impl SmsSender for GatewaySender {
    fn send(&self, phone_number: &str, message: &str) -> DeliveryReport {
        self.client.send_with_report(phone_number, message)
    }
}
