// Lambdacore Conditions
//
// Error taxonomy for the lambda-list subsystem. Parse-time errors surface
// when a function is defined; call-time errors abort the current call and
// propagate to whatever condition layer the embedding host provides. None
// of these are retryable.

use std::fmt;

use crate::lambda_list::{ArgumentMode, LambdaListContext};

/// Errors detected while parsing or classifying a lambda list.
#[derive(Debug, Clone, PartialEq)]
pub enum LambdaListError {
    /// A marker appeared where the current mode forbids it
    IllegalMarker {
        mode: ArgumentMode,
        marker: String,
    },
    /// The context does not permit this mode at all
    IllegalModeForContext {
        mode: ArgumentMode,
        context: LambdaListContext,
    },
    /// More than one name after &rest / &va-rest / a dotted tail
    MultipleRest { existing: String },
    /// Elements follow the dotted-tail parameter
    DotTailNotLast,
    /// A parameter tried to rebind the universal top type T
    ReservedParameterName,
    /// An element had the wrong shape for its section
    MalformedElement { mode: ArgumentMode, detail: String },
    /// The lambda list itself was not a list
    MalformedLambdaList,
    /// A single-dispatch pair had other than two elements
    DispatchPairArity { len: usize },
    /// More than one single-dispatch pair
    MultipleDispatchPairs,
    /// A required element was neither a symbol nor a pair
    DispatchBadElement,
    /// No dispatch pair and first-argument defaulting was not allowed
    MissingDispatchArgument,
    /// No required parameter named by the dispatch query
    UnknownDispatchTarget { name: String },
}

impl fmt::Display for LambdaListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LambdaListError::IllegalMarker { mode, marker } => {
                write!(
                    f,
                    "while in lambda-list mode {} encountered illegal marker {}",
                    mode, marker
                )
            }
            LambdaListError::IllegalModeForContext { mode, context } => {
                write!(f, "illegal mode {} for context {}", mode, context)
            }
            LambdaListError::MultipleRest { existing } => {
                write!(
                    f,
                    "only one name is allowed after &rest - already have {}",
                    existing
                )
            }
            LambdaListError::DotTailNotLast => {
                write!(f, "lambda list dot followed by more than one element")
            }
            LambdaListError::ReservedParameterName => {
                write!(f, "a lambda-list parameter cannot be T")
            }
            LambdaListError::MalformedElement { mode, detail } => {
                write!(f, "malformed {} element: {}", mode, detail)
            }
            LambdaListError::MalformedLambdaList => {
                write!(f, "lambda list is not a list")
            }
            LambdaListError::DispatchPairArity { len } => {
                write!(
                    f,
                    "single-dispatch pair must have exactly two elements, got {}",
                    len
                )
            }
            LambdaListError::MultipleDispatchPairs => {
                write!(f, "more than one single-dispatch pair in lambda list")
            }
            LambdaListError::DispatchBadElement => {
                write!(
                    f,
                    "single-dispatch lambda-list element must be a symbol or a pair"
                )
            }
            LambdaListError::MissingDispatchArgument => {
                write!(f, "no dispatch argument in single-dispatch lambda list")
            }
            LambdaListError::UnknownDispatchTarget { name } => {
                write!(f, "could not find single-dispatch target {}", name)
            }
        }
    }
}

impl std::error::Error for LambdaListError {}

/// Errors raised while binding actual arguments against a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    TooFewArguments {
        function: String,
        given: usize,
        min: usize,
        max: Option<usize>,
    },
    TooManyArguments {
        function: String,
        given: usize,
        min: usize,
        max: Option<usize>,
    },
    OddKeywordArguments {
        function: String,
        given: usize,
    },
    UnrecognizedKeyword {
        function: String,
        keyword: String,
        recognized: Vec<String>,
    },
    /// A &va-rest target classified as special (configuration error)
    VaRestBoundToSpecial {
        symbol: String,
    },
    /// A destructuring required parameter received a non-list
    DestructureMismatch {
        function: String,
    },
    /// The evaluation hook failed on a default or aux initializer
    EvalError(String),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::TooFewArguments {
                function,
                given,
                min,
                max,
            } => {
                write!(
                    f,
                    "too few arguments for {}: given {}, expected at least {}{}",
                    function,
                    given,
                    min,
                    match max {
                        Some(m) => format!(" (at most {})", m),
                        None => String::new(),
                    }
                )
            }
            CallError::TooManyArguments {
                function,
                given,
                min,
                max,
            } => {
                write!(
                    f,
                    "too many arguments for {}: given {}, expected at least {}{}",
                    function,
                    given,
                    min,
                    match max {
                        Some(m) => format!(" and at most {}", m),
                        None => String::new(),
                    }
                )
            }
            CallError::OddKeywordArguments { function, given } => {
                write!(
                    f,
                    "odd number of keyword arguments for {}: {} remaining",
                    function, given
                )
            }
            CallError::UnrecognizedKeyword {
                function,
                keyword,
                recognized,
            } => {
                write!(
                    f,
                    "unrecognized keyword :{} for {} (recognized: {})",
                    keyword,
                    function,
                    recognized.join(", ")
                )
            }
            CallError::VaRestBoundToSpecial { symbol } => {
                write!(f, "cannot bind &va-rest argument {} to a special", symbol)
            }
            CallError::DestructureMismatch { function } => {
                write!(
                    f,
                    "destructuring parameter of {} did not receive a proper list",
                    function
                )
            }
            CallError::EvalError(msg) => write!(f, "evaluation failed: {}", msg),
        }
    }
}

impl std::error::Error for CallError {}
