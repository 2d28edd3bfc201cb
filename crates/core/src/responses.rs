//! Canned agent responses offered at each step of a call.
//!
//! This is a lookup table, not generated text. Any `(scenario, step)` pair
//! without an entry gets [`GENERIC_RESPONSES`] so the choice list is never
//! empty.

use crate::scenario::ScenarioId;

pub const GENERIC_RESPONSES: [&str; 3] = [
    "I understand how frustrating this must be. Let me see what I can do for you.",
    "Thank you for your patience. Could you give me a few more details so I can help?",
    "I'm going to take care of this for you right now.",
];

/// Returns the three response choices for a scenario at a given step.
pub fn response_options(scenario: ScenarioId, step: u32) -> &'static [&'static str] {
    use ScenarioId::*;

    match (scenario, step) {
        (FlightCancellation, 1) => &[
            "I'm so sorry about the cancellation, especially with the wedding tomorrow. Let me look at every option to get you there.",
            "Flights get cancelled sometimes. What's your booking reference?",
            "I understand this is stressful. Can you share your booking reference so I can check alternative flights?",
        ],
        (FlightCancellation, 2) => &[
            "There's a 7 a.m. flight tomorrow that lands at 9:15. I can hold a seat for you right now at no extra cost.",
            "The next available flight is tomorrow evening.",
            "I can rebook you on a partner airline tonight or on our first flight in the morning. Which works better for you?",
        ],
        (FlightCancellation, 3) => &[
            "Since the cancellation was on our side, I'll also add a meal voucher and a hotel near the airport for tonight.",
            "You can claim expenses later through our website.",
            "Would a hotel voucher for tonight help? I can arrange the shuttle as well.",
        ],
        (FlightCancellation, 4) => &[
            "I've confirmed your seat, 14C, and the hotel. You'll get both confirmations by email in the next few minutes.",
            "Everything should be sorted now.",
            "Let me read back the new itinerary so you can double-check every detail.",
        ],
        (FlightCancellation, 5) => &[
            "Is there anything else I can do to make tomorrow easier? I hope the wedding is wonderful.",
            "Thanks for calling.",
            "You're all set. If anything changes overnight, call this number and mention your case ID.",
        ],
        (LostBaggage, 1) => &[
            "I'm sorry your bag didn't arrive, I know how important tomorrow is. Let's locate it together.",
            "Please fill out the lost baggage form.",
            "Can you give me your bag tag number so I can trace it right away?",
        ],
        (LostBaggage, 2) => &[
            "Your bag is showing in Denver. It'll be on the next flight and we'll courier it to your hotel tonight.",
            "It might take a few days to find.",
            "I can see where it is. Would delivery to your hotel or to your office be easier?",
        ],
        (HotelOverbooking, 1) => &[
            "I'm truly sorry, you planned this months ago and it's late with the kids. I'm going to fix this now.",
            "We overbook sometimes, it's standard practice.",
            "Let me check our partner hotels nearby for a family room immediately.",
        ],
        (BillingDispute, 1) => &[
            "I can see the duplicate charge and I'm sorry you had to call three times. I'll start the refund while we're on the phone.",
            "Refunds take five to seven business days.",
            "Let me verify the two transactions so I can reverse the duplicate for you.",
        ],
        (LoyaltyEscalation, 1) => &[
            "Ten years of loyalty deserves better than this month, and I want to make it right personally.",
            "I can transfer you to our loyalty department.",
            "I've pulled up your recent trips. Can you tell me which experience frustrated you most so I can address it first?",
        ],
        _ => &GENERIC_RESPONSES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{CATALOG, MAX_STEPS};

    #[test]
    fn test_flight_cancellation_first_step_has_three_options() {
        let options = response_options(ScenarioId::FlightCancellation, 1);
        assert_eq!(options.len(), 3);
        assert!(options[0].contains("wedding"));
    }

    #[test]
    fn test_unmapped_step_falls_back_to_generic_responses() {
        assert_eq!(response_options(ScenarioId::HotelOverbooking, 4), &GENERIC_RESPONSES);
        assert_eq!(response_options(ScenarioId::FlightCancellation, 42), &GENERIC_RESPONSES);
    }

    #[test]
    fn test_every_step_is_populated() {
        for scenario in CATALOG.iter() {
            for step in 1..=MAX_STEPS {
                assert_eq!(response_options(scenario.id, step).len(), 3);
            }
        }
    }
}
