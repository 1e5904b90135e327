mod files_tests;
mod health_tests;
