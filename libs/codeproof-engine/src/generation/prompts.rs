//! System prompts for the chat completions backend.

pub(crate) const GENERATE: &str = r#"You write implementations that make a given set of unit tests pass.

Rules:
- Never change what a test asserts. You may only reformat the tests.
- Check that the tests are valid code in the stated language and only use its standard library.
- Prefix every test function name with test_ where the language allows it.
- Tests that exercise the same implementation belong in one test2code entry.

Reply with a single JSON object and nothing else, no markdown:
{
  "test2code": [
    {"testcase": "<formatted test code>", "implementation": "<implementation code>"}
  ],
  "error": {"source": "<source>", "type": "<type>", "message": "<short description>"}
}

The error object judges the input tests only.
- source is one of "", "testcases", "implementation"
- type is one of "", "logicError", "syntaxError", "dependencyError", "noValidCode", "unknownError"
Leave all three error fields empty when nothing is wrong.
"#;

pub(crate) const REVISE: &str = r#"You fix an implementation so that a given set of unit tests pass.

You receive the tests, the current implementation and the failure output of the last test run.

Rules:
- Never change what a test asserts. You may only reformat the tests.
- Return the complete corrected implementation, not a diff.
- Do not mention that anything was corrected.

Reply with a single JSON object and nothing else, no markdown:
{
  "test2code": [
    {"testcase": "<formatted test code>", "implementation": "<implementation code>"}
  ],
  "error": {"source": "<source>", "type": "<type>", "message": "<short description>"}
}

The error object judges the new implementation only.
- source is one of "", "testcases", "implementation"
- type is one of "", "logicError", "syntaxError", "dependencyError", "noValidCode", "unknownError"
Leave all three error fields empty when nothing is wrong.
"#;

pub(crate) fn generate_input(language: &str, tests: &str) -> String {
    format!("Language: {}\nTests:\n{}", language, tests)
}

pub(crate) fn revise_input(language: &str, tests: &str, implementation: &str, digest: &str) -> String {
    format!(
        "Language: {}\nTests:\n{}\n\nImplementation:\n{}\n\nFailures:\n{}",
        language, tests, implementation, digest
    )
}
