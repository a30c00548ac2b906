// Bridge between server-issued function calls and local onboarding state

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tracing::{info, warn};

use super::stages::OnboardingStage;
use crate::live::messages::{FunctionCall, FunctionDeclaration, FunctionResponse, FunctionResult, Tool};

pub const SELECT_PAYMENT_OPTION: &str = "selectPaymentOption";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOption {
    FullPayment,
    CreditCard,
    Emi,
}

impl PaymentOption {
    pub const ALL: [PaymentOption; 3] = [
        PaymentOption::FullPayment,
        PaymentOption::CreditCard,
        PaymentOption::Emi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullPayment => "FULL_PAYMENT",
            Self::CreditCard => "CREDIT_CARD",
            Self::Emi => "EMI",
        }
    }

    /// Stage the script moves to after this choice, if the app has to move it
    pub fn stage_transition(self) -> Option<OnboardingStage> {
        match self {
            Self::Emi => Some(OnboardingStage::Nbfc),
            Self::FullPayment | Self::CreditCard => None,
        }
    }
}

impl fmt::Display for PaymentOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct SelectPaymentArgs {
    option: PaymentOption,
}

/// Declaration of `selectPaymentOption` for the setup message
pub fn payment_tool_declaration() -> FunctionDeclaration {
    let options: Vec<&str> = PaymentOption::ALL.iter().map(|o| o.as_str()).collect();
    FunctionDeclaration {
        name: SELECT_PAYMENT_OPTION.to_string(),
        description: "Record the payment option the student chose during the payment stage."
            .to_string(),
        parameters: json!({
            "type": "OBJECT",
            "properties": {
                "option": {
                    "type": "STRING",
                    "enum": options,
                    "description": "The payment option the student selected."
                }
            },
            "required": ["option"]
        }),
    }
}

pub fn payment_tool() -> Tool {
    Tool {
        function_declarations: vec![payment_tool_declaration()],
    }
}

/// What a function call did locally, and the acknowledgment to send back
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub response: FunctionResponse,
    pub selection: Option<PaymentOption>,
    pub stage: Option<OnboardingStage>,
}

fn respond(call: &FunctionCall, result: String) -> FunctionResponse {
    FunctionResponse {
        id: call.id.clone(),
        name: call.name.clone(),
        response: FunctionResult { result },
    }
}

/// Interpret one function call. Every call gets exactly one response,
/// including unknown functions and malformed arguments.
pub fn handle_tool_call(call: &FunctionCall) -> ToolOutcome {
    if call.name != SELECT_PAYMENT_OPTION {
        warn!("Acknowledging unknown function call {} ({})", call.name, call.id);
        return ToolOutcome {
            response: respond(call, format!("Unknown function: {}", call.name)),
            selection: None,
            stage: None,
        };
    }

    let option = match serde_json::from_value::<SelectPaymentArgs>(call.args.clone()) {
        Ok(args) => args.option,
        Err(e) => {
            warn!("Invalid {} arguments {}: {}", SELECT_PAYMENT_OPTION, call.args, e);
            return ToolOutcome {
                response: respond(call, format!("Invalid arguments: {}", e)),
                selection: None,
                stage: None,
            };
        }
    };

    info!("Payment option selected: {}", option);

    let result = match option {
        PaymentOption::Emi => {
            "EMI selected. Moving to the NBFC partner explanation.".to_string()
        }
        other => format!("{} selected.", other),
    };

    ToolOutcome {
        response: respond(call, result),
        selection: Some(option),
        stage: option.stage_transition(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: serde_json::Value) -> FunctionCall {
        FunctionCall {
            id: "call-1".to_string(),
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn test_emi_moves_to_nbfc() {
        let outcome = handle_tool_call(&call(SELECT_PAYMENT_OPTION, json!({"option": "EMI"})));
        assert_eq!(outcome.stage, Some(OnboardingStage::Nbfc));
        assert_eq!(outcome.selection, Some(PaymentOption::Emi));
        assert_eq!(outcome.response.id, "call-1");
        assert_eq!(outcome.response.name, SELECT_PAYMENT_OPTION);
    }

    #[test]
    fn test_credit_card_stays() {
        let outcome = handle_tool_call(&call(SELECT_PAYMENT_OPTION, json!({"option": "CREDIT_CARD"})));
        assert_eq!(outcome.stage, None);
        assert_eq!(outcome.selection, Some(PaymentOption::CreditCard));
        assert_eq!(outcome.response.response.result, "CREDIT_CARD selected.");
    }

    #[test]
    fn test_invalid_option_is_acknowledged() {
        let outcome = handle_tool_call(&call(SELECT_PAYMENT_OPTION, json!({"option": "CASH"})));
        assert_eq!(outcome.stage, None);
        assert_eq!(outcome.selection, None);
        assert!(outcome.response.response.result.starts_with("Invalid arguments"));
    }

    #[test]
    fn test_missing_option_is_acknowledged() {
        let outcome = handle_tool_call(&call(SELECT_PAYMENT_OPTION, serde_json::Value::Null));
        assert_eq!(outcome.selection, None);
        assert_eq!(outcome.response.id, "call-1");
    }

    #[test]
    fn test_unknown_function_is_acknowledged() {
        let outcome = handle_tool_call(&call("bookMeeting", json!({})));
        assert_eq!(outcome.stage, None);
        assert_eq!(outcome.response.name, "bookMeeting");
        assert_eq!(outcome.response.response.result, "Unknown function: bookMeeting");
    }

    #[test]
    fn test_declaration_enumerates_options() {
        let declaration = payment_tool_declaration();
        let options = &declaration.parameters["properties"]["option"]["enum"];
        assert_eq!(options, &json!(["FULL_PAYMENT", "CREDIT_CARD", "EMI"]));
        assert_eq!(declaration.parameters["required"], json!(["option"]));
    }
}
