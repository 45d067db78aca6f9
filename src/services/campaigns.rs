//! Admin email campaigns.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::mailer::{Mail, Mailer};
use crate::domain::aggregates::{Campaign, CampaignError};
use crate::error::Result;
use crate::store::{AccountStore, CampaignStore, Store};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CampaignRequest {
    #[validate(length(min = 1, message = "Subject and body are required"))]
    pub subject: String,
    #[validate(length(min = 1, message = "Subject and body are required"))]
    pub body: String,
}

#[derive(Clone)]
pub struct CampaignService {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
}

impl CampaignService {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self { Self { store, mailer } }

    pub async fn create(&self, request: CampaignRequest) -> Result<Campaign> {
        request.validate()?;
        let campaign = Campaign::create(&request.subject, &request.body)?;
        self.store.insert_campaign(&campaign).await?;
        tracing::info!(campaign_id = %campaign.id, subject = %campaign.subject, "Campaign created");
        Ok(campaign)
    }

    pub async fn list(&self) -> Result<Vec<Campaign>> { Ok(self.store.list_campaigns().await?) }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_campaign(id).await? {
            return Err(CampaignError::NotFound.into());
        }
        Ok(())
    }

    /// Mails the campaign to every account once.
    ///
    /// The sent mark is claimed before mailing so two concurrent sends cannot both
    /// go out; a failed delivery releases it again.
    pub async fn send(&self, id: Uuid) -> Result<Campaign> {
        let campaign = self.store.get_campaign(id).await?.ok_or(CampaignError::NotFound)?;
        if campaign.is_sent() {
            return Err(CampaignError::AlreadySent.into());
        }
        let recipients = self.store.account_emails().await?;
        if recipients.is_empty() {
            return Err(CampaignError::NoRecipients.into());
        }

        let count = i32::try_from(recipients.len()).unwrap_or(i32::MAX);
        let sent = self.store.mark_campaign_sent(id, Utc::now(), count).await?.ok_or(CampaignError::AlreadySent)?;

        let mail = Mail::blind(recipients, &campaign.subject, campaign.body.clone());
        if let Err(e) = self.mailer.send(mail).await {
            tracing::error!(error = %e, campaign_id = %id, "Campaign delivery failed");
            if let Err(e) = self.store.clear_campaign_sent(id).await {
                tracing::error!(error = %e, campaign_id = %id, "Failed to release campaign sent mark");
            }
            return Err(CampaignError::Delivery.into());
        }
        tracing::info!(campaign_id = %id, recipients = count, "Campaign sent");
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Account, Role};
    use crate::services::mailer::{LogMailer, MailError};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct DownMailer;

    #[async_trait]
    impl Mailer for DownMailer {
        async fn send(&self, mail: Mail) -> std::result::Result<(), MailError> {
            Err(MailError::InvalidAddress(mail.subject))
        }
    }

    async fn store_with_account() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let account = Account::new("shopper", "shopper@example.com", "hash".into(), Role::User);
        store.insert_account(&account).await.unwrap();
        store
    }

    fn request() -> CampaignRequest {
        CampaignRequest { subject: "Winter sale".into(), body: "<p>30% off</p>".into() }
    }

    #[tokio::test]
    async fn test_send_once() {
        let campaigns = CampaignService::new(store_with_account().await, Arc::new(LogMailer));
        let campaign = campaigns.create(request()).await.unwrap();

        let sent = campaigns.send(campaign.id).await.unwrap();
        assert_eq!(sent.recipient_count, 1);
        assert!(sent.is_sent());

        let again = campaigns.send(campaign.id).await.unwrap_err();
        assert_eq!(again.to_string(), "Campaign already sent");
    }

    #[tokio::test]
    async fn test_failed_delivery_can_be_retried() {
        let store = store_with_account().await;
        let campaigns = CampaignService::new(store.clone(), Arc::new(DownMailer));
        let campaign = campaigns.create(request()).await.unwrap();

        let err = campaigns.send(campaign.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to send campaign emails");
        assert!(!store.get_campaign(campaign.id).await.unwrap().unwrap().is_sent());

        let retry = CampaignService::new(store, Arc::new(LogMailer));
        assert!(retry.send(campaign.id).await.unwrap().is_sent());
    }

    #[tokio::test]
    async fn test_send_needs_recipients() {
        let campaigns = CampaignService::new(Arc::new(MemoryStore::new()), Arc::new(LogMailer));
        let campaign = campaigns.create(request()).await.unwrap();
        assert_eq!(campaigns.send(campaign.id).await.unwrap_err().to_string(), "No users to send email to");
        assert_eq!(campaigns.send(Uuid::now_v7()).await.unwrap_err().to_string(), "Campaign not found");
        assert_eq!(campaigns.create(CampaignRequest::default()).await.unwrap_err().to_string(), "Subject and body are required");
    }
}
