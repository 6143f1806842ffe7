use bentley::*;

#[test]
fn test_basic_logging_functions() {
  // Test that basic logging functions can be called without panicking
  info("Test info message");
  warn("Test warning message");
  error("Test error message");
  debug("Test debug message");
  verbose("Test verbose message");
  success("Test success message");
}

#[test]
fn test_multiline_messages() {
  let multiline_msg = "First line\nSecond line\nThird line";
  info(multiline_msg);
  warn(multiline_msg);
  error(multiline_msg);
  success(multiline_msg);
}

#[test]
fn test_macros_expand_to_level_functions() {
  let message = format!("{} passages", 3);
  bentley::info!(&message);
  bentley::warn!(&message);
  bentley::verbose!("quiet unless verbose");
}
