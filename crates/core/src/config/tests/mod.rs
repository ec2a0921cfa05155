mod loading_tests;
mod validation_tests;
