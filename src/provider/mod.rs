pub mod google_gemini;
pub mod retry;
