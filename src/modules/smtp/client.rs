use mail_send::smtp::message::IntoMessage;
use mail_send::SmtpClient;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

pub enum MailSpoolSmtpClient {
    Plain(SmtpClient<TcpStream>),
    Tls(SmtpClient<TlsStream<TcpStream>>),
}

impl MailSpoolSmtpClient {
    pub async fn send_message<'x>(
        &mut self,
        message: impl IntoMessage<'x>,
    ) -> Result<(), mail_send::Error> {
        match self {
            MailSpoolSmtpClient::Plain(smtp_client) => smtp_client.send(message).await,
            MailSpoolSmtpClient::Tls(smtp_client) => smtp_client.send(message).await,
        }
    }
}
