//! Credit kinds and per-kind amounts.

use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::money::Credits;

str_enum! {
    /// The three kinds of credit a balance is held in.
    ///
    /// Declaration order is the consumption order of an expense.
    pub enum CreditKind {
        /// Refillable quota, consumed first.
        Free => "free_credits",
        /// Promotional grants, consumed second.
        Reward => "reward_credits",
        /// Paid credits, consumed last.
        Permanent => "credits",
    }
}

impl CreditKind {
    /// Order in which an expense draws on the kinds.
    pub const CONSUMPTION_ORDER: [Self; 3] = [Self::Free, Self::Reward, Self::Permanent];
}

/// One amount per credit kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindAmounts {
    /// Free credits.
    pub free: Credits,
    /// Reward credits.
    pub reward: Credits,
    /// Permanent credits.
    pub permanent: Credits,
}

impl KindAmounts {
    /// All kinds zero.
    pub const ZERO: Self = Self {
        free: Credits::ZERO,
        reward: Credits::ZERO,
        permanent: Credits::ZERO,
    };

    /// `amount` of a single kind, zero for the others.
    #[must_use]
    pub fn single(kind: CreditKind, amount: Credits) -> Self {
        let mut amounts = Self::ZERO;
        *amounts.get_mut(kind) = amount;
        amounts
    }

    /// Amount held in `kind`.
    #[must_use]
    pub const fn get(&self, kind: CreditKind) -> Credits {
        match kind {
            CreditKind::Free => self.free,
            CreditKind::Reward => self.reward,
            CreditKind::Permanent => self.permanent,
        }
    }

    /// Mutable access to the amount held in `kind`.
    pub fn get_mut(&mut self, kind: CreditKind) -> &mut Credits {
        match kind {
            CreditKind::Free => &mut self.free,
            CreditKind::Reward => &mut self.reward,
            CreditKind::Permanent => &mut self.permanent,
        }
    }

    /// Sum over all kinds.
    #[must_use]
    pub fn total(&self) -> Credits {
        self.free + self.reward + self.permanent
    }

    /// `(kind, amount)` pairs in consumption order.
    pub fn iter(&self) -> impl Iterator<Item = (CreditKind, Credits)> + '_ {
        CreditKind::CONSUMPTION_ORDER
            .into_iter()
            .map(move |kind| (kind, self.get(kind)))
    }

    /// Kinds with a positive amount, in consumption order.
    #[must_use]
    pub fn kinds_used(&self) -> Vec<CreditKind> {
        self.iter()
            .filter(|(_, amount)| amount.is_positive())
            .map(|(kind, _)| kind)
            .collect()
    }

    /// The kind an event is labelled with: permanent if any was used, else
    /// reward, else free.
    #[must_use]
    pub fn dominant_kind(&self) -> Option<CreditKind> {
        [CreditKind::Permanent, CreditKind::Reward, CreditKind::Free]
            .into_iter()
            .find(|kind| self.get(*kind).is_positive())
    }
}

impl Add for KindAmounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            free: self.free + rhs.free,
            reward: self.reward + rhs.reward,
            permanent: self.permanent + rhs.permanent,
        }
    }
}

impl Sub for KindAmounts {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            free: self.free - rhs.free,
            reward: self.reward - rhs.reward,
            permanent: self.permanent - rhs.permanent,
        }
    }
}

impl AddAssign for KindAmounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for KindAmounts {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
