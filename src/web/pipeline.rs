//! Assembles the request pipeline around the base application.

use crate::config::Settings;
use crate::web::HttpService;
use crate::web::request_log::RequestLoggingLayer;
use crate::web::static_files::StaticFilesLayer;
use std::fmt::{Display, Formatter};
use tower::ServiceBuilder;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineLayer {
    RequestLogging,
    StaticFiles,
}

impl Display for PipelineLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineLayer::RequestLogging => write!(f, "request logging"),
            PipelineLayer::StaticFiles => write!(f, "static files"),
        }
    }
}

/// The fully wrapped application. Cheap to clone, one clone per connection.
#[derive(Clone)]
pub struct Pipeline {
    service: HttpService,
    layers: Vec<PipelineLayer>,
}

impl Pipeline {
    /// Wraps `base` with request logging and, unless debug is on, static file serving.
    ///
    /// Static files are the outermost layer, so requests they answer are not
    /// passed through the request log.
    pub fn assemble(settings: &Settings, base: HttpService) -> Pipeline {
        let mut layers = vec![PipelineLayer::RequestLogging];
        let logged = ServiceBuilder::new()
            .layer(RequestLoggingLayer)
            .service(base);

        let service = if settings.debug {
            tracing::debug!("Debug mode is on, static files are not served by the pipeline");
            HttpService::new(logged)
        } else {
            layers.push(PipelineLayer::StaticFiles);
            HttpService::new(
                ServiceBuilder::new()
                    .layer(StaticFilesLayer::new(&settings.static_files))
                    .service(logged),
            )
        };

        tracing::info!(
            "Assembled request pipeline: {}",
            layers
                .iter()
                .map(PipelineLayer::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        Pipeline { service, layers }
    }

    /// Applied layers, innermost first.
    pub fn layers(&self) -> &[PipelineLayer] {
        &self.layers
    }

    pub fn service(&self) -> HttpService {
        self.service.clone()
    }
}
