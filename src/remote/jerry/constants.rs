//! Message type codes of the JerryScript debugger protocol.

/// Messages sent by the engine.
pub mod server {
    pub const CONFIGURATION: u8 = 1;
    pub const PARSE_ERROR: u8 = 2;
    pub const BYTE_CODE_CP: u8 = 3;
    pub const PARSE_FUNCTION: u8 = 4;
    pub const BREAKPOINT_LIST: u8 = 5;
    pub const BREAKPOINT_OFFSET_LIST: u8 = 6;
    pub const SOURCE_CODE: u8 = 7;
    pub const SOURCE_CODE_END: u8 = 8;
    pub const SOURCE_CODE_NAME: u8 = 9;
    pub const SOURCE_CODE_NAME_END: u8 = 10;
    pub const FUNCTION_NAME: u8 = 11;
    pub const FUNCTION_NAME_END: u8 = 12;
    pub const WAITING_AFTER_PARSE: u8 = 13;
    pub const RELEASE_BYTE_CODE_CP: u8 = 14;
    pub const MEMSTATS_RECEIVE: u8 = 15;
    pub const BREAKPOINT_HIT: u8 = 16;
    pub const EXCEPTION_HIT: u8 = 17;
    pub const EXCEPTION_STR: u8 = 18;
    pub const EXCEPTION_STR_END: u8 = 19;
    pub const BACKTRACE: u8 = 20;
    pub const BACKTRACE_END: u8 = 21;
    pub const EVAL_RESULT: u8 = 22;
    pub const EVAL_RESULT_END: u8 = 23;
    pub const WAIT_FOR_SOURCE: u8 = 24;
    pub const OUTPUT_RESULT: u8 = 25;
    pub const OUTPUT_RESULT_END: u8 = 26;
}

/// Messages sent by the client.
pub mod client {
    pub const FREE_BYTE_CODE_CP: u8 = 1;
    pub const UPDATE_BREAKPOINT: u8 = 2;
    pub const STOP: u8 = 6;
    pub const PARSER_RESUME: u8 = 7;
    pub const CONTINUE: u8 = 12;
    pub const STEP: u8 = 13;
    pub const NEXT: u8 = 14;
    pub const FINISH: u8 = 15;
    pub const GET_BACKTRACE: u8 = 16;
    pub const EVAL: u8 = 17;
    pub const EVAL_PART: u8 = 18;
}

/// First payload byte of an `EVAL` request: evaluate the expression.
pub const EVAL_SUBTYPE_EVAL: u8 = 0;

/// Name the engine gives to the WebSocket endpoint.
pub const ENDPOINT: &str = "/jerry-debugger";
