pub mod cohere_client;
pub mod openai_client;
