//! # Interaction Classification
//!
//! Decides, per interaction, how the fold treats it: apply it directly,
//! evaluate it as an internal write through the writing contract, or skip
//! it as noise.

use serde_json::Value as JsonValue;
use weft_types::{ContractCall, Interaction, InteractionType, TxId};

/// How the fold handles one interaction of a contract's stream.
#[derive(Clone, Debug)]
pub enum Disposition {
    /// The interaction targets this contract; apply it through the
    /// handler with the signing wallet as caller.
    Direct(ContractCall),
    /// The interaction targets another contract and declares a write
    /// against this one; its effect arrives through the writer's fold.
    InternalWrite {
        /// The contract whose handler produces the staged write.
        writer: TxId,
    },
    /// No input, unparsable input: invalid with a message.
    Invalid(String),
    /// Not addressed to this contract in any way the current options
    /// evaluate; ignored without a verdict.
    Noise,
}

/// Classifies `interaction` relative to the contract being folded.
///
/// Internal writes only exist when the evaluation enables them; with
/// `internal_writes` off a foreign-targeted interaction is noise even if
/// it names this contract in an `Interact-Write` tag.
#[must_use]
pub fn classify(contract: &TxId, interaction: &Interaction, internal_writes: bool) -> Disposition {
    let target = interaction.target_contract();
    let is_direct = target.as_ref() == Some(contract);

    if !is_direct {
        if internal_writes
            && interaction
                .interact_write_targets()
                .iter()
                .any(|t| t == contract)
        {
            return match target {
                Some(writer) => Disposition::InternalWrite { writer },
                None => Disposition::Invalid(
                    "internal write carries no target contract tag".to_string(),
                ),
            };
        }
        return Disposition::Noise;
    }

    match parse_input(interaction) {
        Ok(input) => Disposition::Direct(ContractCall {
            input,
            caller: interaction.owner_address.clone(),
            interaction_type: InteractionType::Write,
        }),
        Err(message) => Disposition::Invalid(message),
    }
}

/// Extracts and parses the `Input` tag payload.
pub fn parse_input(interaction: &Interaction) -> Result<JsonValue, String> {
    let raw = interaction
        .input_tag()
        .ok_or_else(|| format!("interaction {} carries no input tag", interaction.id))?;
    serde_json::from_str(raw)
        .map_err(|e| format!("interaction {} input is not valid json: {e}", interaction.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::{tags, BlockRef, Tag};

    fn interaction(tag_pairs: &[(&str, &str)]) -> Interaction {
        let mut i = Interaction::test_stub(
            "i1",
            BlockRef {
                height: 1,
                id: "b1".into(),
                timestamp: 1_600_000_000,
            },
        );
        i.tags = tag_pairs
            .iter()
            .map(|(name, value)| Tag::new(*name, *value))
            .collect();
        i
    }

    #[test]
    fn test_direct_interaction_parses_input() {
        let i = interaction(&[
            (tags::CONTRACT, "me"),
            (tags::INPUT, r#"{"function":"transfer","qty":5}"#),
        ]);
        match classify(&TxId::from("me"), &i, false) {
            Disposition::Direct(call) => {
                assert_eq!(call.input["function"], "transfer");
                assert_eq!(call.caller, i.owner_address);
                assert_eq!(call.interaction_type, InteractionType::Write);
            }
            other => panic!("expected direct, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_input_is_invalid() {
        let i = interaction(&[(tags::CONTRACT, "me")]);
        assert!(matches!(
            classify(&TxId::from("me"), &i, false),
            Disposition::Invalid(_)
        ));
    }

    #[test]
    fn test_unparsable_input_is_invalid() {
        let i = interaction(&[(tags::CONTRACT, "me"), (tags::INPUT, "{nope")]);
        assert!(matches!(
            classify(&TxId::from("me"), &i, false),
            Disposition::Invalid(_)
        ));
    }

    #[test]
    fn test_internal_write_requires_option() {
        let i = interaction(&[
            (tags::CONTRACT, "writer"),
            (tags::INTERACT_WRITE, "me"),
            (tags::INPUT, r#"{"function":"deposit"}"#),
        ]);
        assert!(matches!(
            classify(&TxId::from("me"), &i, false),
            Disposition::Noise
        ));
        match classify(&TxId::from("me"), &i, true) {
            Disposition::InternalWrite { writer } => assert_eq!(writer.as_str(), "writer"),
            other => panic!("expected internal write, got {other:?}"),
        }
    }

    #[test]
    fn test_unrelated_interaction_is_noise() {
        let i = interaction(&[(tags::CONTRACT, "someone-else"), (tags::INPUT, "{}")]);
        assert!(matches!(
            classify(&TxId::from("me"), &i, true),
            Disposition::Noise
        ));
    }
}
