//! Fee arithmetic.
//!
//! A charge is a base cost plus up to three fee legs (platform, developer,
//! agent owner). `FeeQuote` computes the legs in that fixed order, each one
//! quantized before it feeds the next. Once the payer's account has said how
//! much of each credit kind it paid, `FeeSplit` spreads every leg across those
//! kinds; the last kind actually paid absorbs rounding so each leg stays
//! exact, and the base leg takes whatever is left of each kind.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::kind::KindAmounts;
use crate::money::Credits;
use crate::pricing::PaymentSettings;

/// Base cost and fee legs of one charge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    /// Base cost before discount.
    pub base_original: Credits,
    /// Discount on the base cost.
    pub base_discount: Credits,
    /// Base cost charged.
    pub base: Credits,
    /// Platform fee.
    pub fee_platform: Credits,
    /// Skill developer fee.
    pub fee_dev: Credits,
    /// Agent owner fee.
    pub fee_agent: Credits,
}

impl FeeQuote {
    /// Quote an LLM message or memory summarization.
    ///
    /// Platform fee on the base, agent fee on base plus platform fee.
    #[must_use]
    pub fn message(
        base_original: Credits,
        settings: &PaymentSettings,
        agent_fee_percentage: Option<Decimal>,
    ) -> Self {
        Self::compute(base_original, settings, None, agent_fee_percentage)
    }

    /// Quote a skill call.
    ///
    /// Platform and developer fees on the base, agent fee on base plus both.
    #[must_use]
    pub fn skill(
        base_original: Credits,
        settings: &PaymentSettings,
        agent_fee_percentage: Option<Decimal>,
    ) -> Self {
        Self::compute(
            base_original,
            settings,
            Some(settings.fee_dev_percentage),
            agent_fee_percentage,
        )
    }

    fn compute(
        base_original: Credits,
        settings: &PaymentSettings,
        dev_percentage: Option<Decimal>,
        agent_percentage: Option<Decimal>,
    ) -> Self {
        if !settings.payment_enabled {
            return Self {
                base_original,
                base_discount: base_original,
                ..Self::default()
            };
        }

        let base = base_original;
        let fee_platform = base.percent(settings.fee_platform_percentage);
        let fee_dev = dev_percentage.map_or(Credits::ZERO, |pct| base.percent(pct));
        let fee_agent = agent_percentage
            .map_or(Credits::ZERO, |pct| (base + fee_platform + fee_dev).percent(pct));

        Self {
            base_original,
            base_discount: Credits::ZERO,
            base,
            fee_platform,
            fee_dev,
            fee_agent,
        }
    }

    /// Amount the payer is charged.
    #[must_use]
    pub fn total(&self) -> Credits {
        self.base + self.fee_platform + self.fee_dev + self.fee_agent
    }
}

/// Per-kind breakdown of every leg of a charge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// Base leg.
    pub base: KindAmounts,
    /// Platform fee leg.
    pub fee_platform: KindAmounts,
    /// Developer fee leg.
    pub fee_dev: KindAmounts,
    /// Agent fee leg.
    pub fee_agent: KindAmounts,
}

impl FeeSplit {
    /// Spread `quote` across the kinds in `paid`.
    ///
    /// `paid` must total `quote.total()`. For every kind, the four legs sum
    /// to what that kind paid.
    #[must_use]
    pub fn new(quote: &FeeQuote, paid: &KindAmounts) -> Self {
        let total = paid.total();
        let fee_platform = split_leg(quote.fee_platform, paid, total);
        let fee_dev = split_leg(quote.fee_dev, paid, total);
        let fee_agent = split_leg(quote.fee_agent, paid, total);

        Self {
            base: *paid - fee_platform - fee_dev - fee_agent,
            fee_platform,
            fee_dev,
            fee_agent,
        }
    }
}

fn split_leg(leg: Credits, paid: &KindAmounts, total: Credits) -> KindAmounts {
    let used = paid.kinds_used();
    let Some((&last, rest)) = used.split_last() else {
        return KindAmounts::ZERO;
    };
    if !leg.is_positive() || !total.is_positive() {
        return KindAmounts::ZERO;
    }

    let mut split = KindAmounts::ZERO;
    for &kind in rest {
        *split.get_mut(kind) = leg.prorate(paid.get(kind), total);
    }
    *split.get_mut(last) = leg - split.total();
    split
}
