//! Scenario Catalog
//!
//! Static definitions of the training calls an agent can practise. The order
//! of [`CATALOG`] is the unlock order: a scenario becomes available once the
//! one before it has been passed.

use crate::transcript::Emotion;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of agent turns in every scripted call.
pub const MAX_STEPS: u32 = 5;

/// Identifier of a catalog scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScenarioId {
    FlightCancellation,
    LostBaggage,
    HotelOverbooking,
    BillingDispute,
    LoyaltyEscalation,
}

impl ScenarioId {
    /// The identifier used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlightCancellation => "flightCancellation",
            Self::LostBaggage => "lostBaggage",
            Self::HotelOverbooking => "hotelOverbooking",
            Self::BillingDispute => "billingDispute",
            Self::LoyaltyEscalation => "loyaltyEscalation",
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scenario id: '{0}'")]
pub struct UnknownScenarioId(pub String);

impl FromStr for ScenarioId {
    type Err = UnknownScenarioId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CATALOG
            .iter()
            .map(|scenario| scenario.id)
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownScenarioId(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

/// An immutable catalog entry describing one training call.
#[derive(Debug, Clone, Serialize)]
pub struct Scenario {
    pub id: ScenarioId,
    pub title: &'static str,
    pub description: &'static str,
    pub duration_minutes: u32,
    pub difficulty: Difficulty,
    /// Minimum average turn score (0-100) needed to pass.
    pub passing_score: u8,
    /// The customer's first line, shown before the agent says anything.
    pub opening_line: &'static str,
    pub opening_emotion: Emotion,
    /// Who the simulated customer is; fed into the customer prompt.
    pub persona: &'static str,
}

/// Every scenario, in unlock order.
pub static CATALOG: [Scenario; 5] = [
    Scenario {
        id: ScenarioId::FlightCancellation,
        title: "Flight Cancellation",
        description: "A traveller's flight was cancelled hours before departure and they need to get to a family event.",
        duration_minutes: 5,
        difficulty: Difficulty::Beginner,
        passing_score: 70,
        opening_line: "Hi, my flight to Chicago was just cancelled and I have to be at my sister's wedding tomorrow. What are my options?",
        opening_emotion: Emotion::Anxious,
        persona: "Sarah, a stressed but polite traveller who needs to reach Chicago by tomorrow afternoon.",
    },
    Scenario {
        id: ScenarioId::LostBaggage,
        title: "Lost Baggage",
        description: "A customer landed without their checked bag and has an important meeting in the morning.",
        duration_minutes: 6,
        difficulty: Difficulty::Beginner,
        passing_score: 70,
        opening_line: "My suitcase never showed up on the carousel. Everything I need for tomorrow's presentation is in there.",
        opening_emotion: Emotion::Anxious,
        persona: "Daniel, a business traveller who is anxious and short on time.",
    },
    Scenario {
        id: ScenarioId::HotelOverbooking,
        title: "Hotel Overbooking",
        description: "A guest arrives late at night to find the hotel has given their confirmed room away.",
        duration_minutes: 7,
        difficulty: Difficulty::Intermediate,
        passing_score: 75,
        opening_line: "I booked this room three months ago and now you're telling me there's nothing available? It's midnight!",
        opening_emotion: Emotion::Frustrated,
        persona: "Maria, a tired guest travelling with two young children.",
    },
    Scenario {
        id: ScenarioId::BillingDispute,
        title: "Billing Dispute",
        description: "A customer was charged twice for the same booking and wants the money back immediately.",
        duration_minutes: 8,
        difficulty: Difficulty::Intermediate,
        passing_score: 75,
        opening_line: "I've been charged twice for the same trip. That's four hundred dollars I need back today.",
        opening_emotion: Emotion::Frustrated,
        persona: "James, a frustrated customer who has already called twice without a resolution.",
    },
    Scenario {
        id: ScenarioId::LoyaltyEscalation,
        title: "Loyalty Member Escalation",
        description: "A top-tier loyalty member threatens to leave after a string of bad experiences.",
        duration_minutes: 10,
        difficulty: Difficulty::Advanced,
        passing_score: 80,
        opening_line: "I've been a platinum member for ten years and this is the third time this month you've let me down. Give me one reason not to switch airlines.",
        opening_emotion: Emotion::Angry,
        persona: "Eleanor, a high-value customer who is angry, articulate, and expects to be treated as a priority.",
    },
];

/// Looks up a scenario in the catalog.
pub fn find(id: ScenarioId) -> &'static Scenario {
    // Every ScenarioId variant has exactly one catalog entry.
    CATALOG
        .iter()
        .find(|scenario| scenario.id == id)
        .unwrap_or(&CATALOG[0])
}

/// Position of a scenario in unlock order.
pub fn position(id: ScenarioId) -> usize {
    CATALOG
        .iter()
        .position(|scenario| scenario.id == id)
        .unwrap_or(0)
}
