//! Per-method instrumentation driven by compilation events.
//!
//! A [`CoverageSession`] sits between the runtime and the rewriter. When the runtime is
//! about to compile a function, [`CoverageSession::compile`]:
//!
//! 1. resolves the function to its module and method token
//! 2. asks the [`PointSource`] for the points of that method
//! 3. fetches and decodes the method body
//! 4. skips the method if its first statement probe is already present
//! 5. places the probes
//! 6. allocates exactly [`crate::rewriter::Method::method_size`] bytes through the host,
//!    writes the new body into them and hands the buffer back
//!
//! Every failure is confined to the method being compiled. It is logged, returned, and the
//! runtime compiles the original body.

use crate::{
    coverage::{
        instrument, is_already_instrumented, Instrumentation, InstrumentationConfig,
        InstrumentationPoints, Probe, ProbeStyle,
    },
    metadata::token::Token,
    rewriter::Method,
    Error, Result,
};

/// Runtime handle of a function about to be compiled.
pub type FunctionId = u64;

/// Runtime handle of a loaded module.
pub type ModuleId = u64;

/// What the runtime knows about a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    /// Module defining the function
    pub module: ModuleId,
    /// Path of the module image, as the point source knows it
    pub module_path: String,
    /// `MethodDef` token of the function
    pub token: Token,
}

/// The runtime services instrumentation depends on.
pub trait RuntimeHost: Send + Sync {
    /// Resolves a function handle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Host`] if the runtime cannot resolve the handle.
    fn function_info(&self, function: FunctionId) -> Result<FunctionInfo>;

    /// Fetches the raw body of a method.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Host`] if the body cannot be read.
    fn method_body(&self, module: ModuleId, token: Token) -> Result<Vec<u8>>;

    /// Resolves the probe for a module, injecting its references if needed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Host`] if the probe cannot be made available in the module.
    fn probe(&self, module: ModuleId, style: ProbeStyle) -> Result<Probe>;

    /// Allocates the buffer for a new body of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Host`] if the allocation fails.
    fn allocate_method_body(&self, module: ModuleId, size: usize) -> Result<Vec<u8>>;

    /// Replaces the body of a method with `body`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Host`] if the runtime rejects the body.
    fn set_method_body(&self, module: ModuleId, token: Token, body: Vec<u8>) -> Result<()>;
}

/// The collector side that decides where probes go.
pub trait PointSource: Send + Sync {
    /// Points for one method, or `None` if the method is not tracked.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::PointsUnavailable`] if the request fails.
    fn instrumentation_points(
        &self,
        function: &FunctionInfo,
    ) -> Result<Option<InstrumentationPoints>>;
}

/// Result of handling one compilation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The body was rewritten and handed back to the runtime
    Instrumented {
        /// Method that was rewritten
        token: Token,
        /// Probes placed
        probes: Instrumentation,
        /// Size of the new body in bytes
        size: usize,
    },
    /// The collector has no points for this method
    NotTracked,
    /// The body already carries its probes
    AlreadyInstrumented,
}

/// Instruments methods as the runtime compiles them.
pub struct CoverageSession<H: RuntimeHost, P: PointSource> {
    host: H,
    points: P,
    config: InstrumentationConfig,
}

impl<H: RuntimeHost, P: PointSource> CoverageSession<H, P> {
    /// Creates a session over a host and a point source.
    pub fn new(host: H, points: P, config: InstrumentationConfig) -> Self {
        CoverageSession {
            host,
            points,
            config,
        }
    }

    /// The runtime host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The active configuration.
    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    /// Handles a compilation event for `function`.
    ///
    /// # Errors
    ///
    /// Returns the host, point source or rewriter error that stopped instrumentation of
    /// this method. The runtime then compiles the original body.
    pub fn compile(&self, function: FunctionId) -> Result<Outcome> {
        self.try_compile(function).inspect_err(|error| {
            log::warn!(
                "Function {:#x} left uninstrumented ({}): {}",
                function,
                if error.is_host_failure() { "host" } else { "body" },
                error
            );
        })
    }

    fn try_compile(&self, function: FunctionId) -> Result<Outcome> {
        let info = self.host.function_info(function)?;

        let points = match self.points.instrumentation_points(&info)? {
            Some(points) if !points.is_empty() => points,
            _ => return Ok(Outcome::NotTracked),
        };

        let body = self.host.method_body(info.module, info.token)?;
        let mut method = Method::decode(&body)?;
        let probe = self.host.probe(info.module, self.config.probe)?;

        if self.config.skip_instrumented && is_already_instrumented(&method, &points, &probe) {
            log::debug!("Method {} already instrumented", info.token);
            return Ok(Outcome::AlreadyInstrumented);
        }

        log::trace!("Method {} before instrumentation:\n{}", info.token, method);
        let probes = instrument(&mut method, &points, &probe, &self.config)?;
        log::trace!("Method {} after instrumentation:\n{}", info.token, method);

        let size = method.method_size();
        let mut buffer = self.host.allocate_method_body(info.module, size)?;
        if buffer.len() != size {
            return Err(Error::Host(format!(
                "allocator returned {} bytes for a {} byte body",
                buffer.len(),
                size
            )));
        }

        method.write(&mut buffer)?;
        self.host.set_method_body(info.module, info.token, buffer)?;

        log::debug!(
            "Method {} instrumented with {} probes, {} -> {} bytes",
            info.token,
            probes.total(),
            body.len(),
            size
        );

        Ok(Outcome::Instrumented {
            token: info.token,
            probes,
            size,
        })
    }
}
