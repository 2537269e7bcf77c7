//! Pricing configuration for the credit ledger.
//!
//! This module defines the platform-wide payment settings, the skill price
//! catalogue and the per-agent billing snapshot the executor passes in with
//! every billable call.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, UserId};
use crate::money::Credits;

// ============================================================================
// Constants
// ============================================================================

/// Price of a skill call when the catalogue entry does not set one.
pub const DEFAULT_SKILL_CALL_PRICE: Decimal = Decimal::TEN;

/// Price of a skill call made with the agent owner's own API key.
pub const DEFAULT_SKILL_CALL_SELF_KEY_PRICE: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Free quota given to new user accounts.
pub const DEFAULT_FREE_QUOTA: i64 = 480;

/// Hourly refill given to new user accounts.
pub const DEFAULT_REFILL_AMOUNT: i64 = 20;

/// Platform-wide payment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSettings {
    /// When false every expense is fully discounted and nothing is charged.
    pub payment_enabled: bool,

    /// Platform fee, percent of the base cost.
    pub fee_platform_percentage: Decimal,

    /// Skill developer fee, percent of the base skill cost.
    pub fee_dev_percentage: Decimal,

    /// Free quota for newly created user accounts.
    pub default_free_quota: Credits,

    /// Hourly refill for newly created user accounts.
    pub default_refill_amount: Credits,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            payment_enabled: true,
            fee_platform_percentage: Decimal::TEN,
            fee_dev_percentage: Decimal::TEN,
            default_free_quota: Credits::whole(DEFAULT_FREE_QUOTA),
            default_refill_amount: Credits::whole(DEFAULT_REFILL_AMOUNT),
        }
    }
}

/// Price of one skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillPrice {
    /// Skill name as the executor reports it.
    pub name: String,

    /// Category; agents choose the API key provider per category.
    pub category: String,

    /// Price per call.
    #[serde(default = "default_price")]
    pub price: Credits,

    /// Price per call when the agent owner supplies the API key.
    #[serde(default = "default_self_key_price")]
    pub price_self_key: Credits,

    /// Developer who receives the dev fee; the `platform_dev` sink if unset.
    #[serde(default)]
    pub author: Option<UserId>,
}

fn default_price() -> Credits {
    Credits::new(DEFAULT_SKILL_CALL_PRICE)
}

fn default_self_key_price() -> Credits {
    Credits::new(DEFAULT_SKILL_CALL_SELF_KEY_PRICE)
}

impl SkillPrice {
    /// A skill at the default prices with no author.
    #[must_use]
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            price: default_price(),
            price_self_key: default_self_key_price(),
            author: None,
        }
    }

    /// Set both prices.
    #[must_use]
    pub fn with_prices(mut self, price: Credits, price_self_key: Credits) -> Self {
        self.price = price;
        self.price_self_key = price_self_key;
        self
    }

    /// Set the author.
    #[must_use]
    pub fn with_author(mut self, author: UserId) -> Self {
        self.author = Some(author);
        self
    }

    /// Base price for a call made by `agent`.
    #[must_use]
    pub fn base_price(&self, agent: &AgentBilling) -> Credits {
        if agent.uses_owner_key(&self.category) {
            self.price_self_key
        } else {
            self.price
        }
    }
}

/// Skill price catalogue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PricingConfig {
    skills: HashMap<String, SkillPrice>,
}

/// On-disk form of the catalogue.
#[derive(Debug, Deserialize)]
struct PricingFile {
    skills: Vec<SkillPrice>,
}

impl PricingConfig {
    /// Build a catalogue from skill prices (later entries win).
    #[must_use]
    pub fn from_skills(skills: impl IntoIterator<Item = SkillPrice>) -> Self {
        Self {
            skills: skills
                .into_iter()
                .map(|skill| (skill.name.clone(), skill))
                .collect(),
        }
    }

    /// Parse a catalogue from `{"skills": [...]}` JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the expected shape.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let file: PricingFile = serde_json::from_str(json)?;
        Ok(Self::from_skills(file.skills))
    }

    /// Look up a skill by name.
    #[must_use]
    pub fn skill(&self, name: &str) -> Option<&SkillPrice> {
        self.skills.get(name)
    }

    /// Add or replace a skill.
    pub fn insert(&mut self, skill: SkillPrice) {
        self.skills.insert(skill.name.clone(), skill);
    }

    /// Number of priced skills.
    #[must_use]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// `true` when no skill is priced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

str_enum! {
    /// Whose API key an agent uses for a skill category.
    pub enum ApiKeyProvider {
        /// The platform's key (regular price).
        Platform => "platform",
        /// The agent owner's key (self-key price).
        AgentOwner => "agent_owner",
    }
}

/// Billing-relevant snapshot of an agent, supplied by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentBilling {
    /// Agent id.
    pub id: AgentId,

    /// Owning user, who receives withdrawals.
    #[serde(default)]
    pub owner: Option<UserId>,

    /// Agent fee, percent of base plus the other fees.
    #[serde(default)]
    pub fee_percentage: Option<Decimal>,

    /// Model the agent runs with.
    #[serde(default)]
    pub model: Option<String>,

    /// API key provider per skill category.
    #[serde(default)]
    pub key_providers: HashMap<String, ApiKeyProvider>,
}

impl AgentBilling {
    /// An agent with no owner, no fee and no skill configuration.
    #[must_use]
    pub fn new(id: impl Into<AgentId>) -> Self {
        Self {
            id: id.into(),
            owner: None,
            fee_percentage: None,
            model: None,
            key_providers: HashMap::new(),
        }
    }

    /// Set the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<UserId>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Set the agent fee percentage.
    #[must_use]
    pub fn with_fee_percentage(mut self, percentage: Decimal) -> Self {
        self.fee_percentage = Some(percentage);
        self
    }

    /// Set the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Use the owner's API key for a skill category.
    #[must_use]
    pub fn with_owner_key(mut self, category: impl Into<String>) -> Self {
        self.key_providers
            .insert(category.into(), ApiKeyProvider::AgentOwner);
        self
    }

    /// Agent fee percentage charged to `payer`.
    ///
    /// `None` when the agent charges no fee or the payer owns the agent.
    #[must_use]
    pub fn fee_percentage_for(&self, payer: &UserId) -> Option<Decimal> {
        let percentage = self.fee_percentage.filter(|p| *p > Decimal::ZERO)?;
        if self.owner.as_ref() == Some(payer) {
            return None;
        }
        Some(percentage)
    }

    /// Whether calls in `category` run on the owner's API key.
    #[must_use]
    pub fn uses_owner_key(&self, category: &str) -> bool {
        self.key_providers.get(category) == Some(&ApiKeyProvider::AgentOwner)
    }
}
