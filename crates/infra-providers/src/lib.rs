// Perfscope Infrastructure - Provider Adapters
// Implements: MeasurementCapability, TestProvider (x2), VisualCapture,
// Recommender, ReportRenderer

mod http;

pub mod chromium_capture;
pub mod gtmetrix;
pub mod http_probe;
pub mod json_report;
pub mod openai_recommender;
pub mod webpagetest;

pub use chromium_capture::ChromiumCapture;
pub use gtmetrix::GtMetrixProvider;
pub use http_probe::HttpTimingProbe;
pub use json_report::JsonReportRenderer;
pub use openai_recommender::OpenAiRecommender;
pub use webpagetest::WebPageTestProvider;
