//! Graphics instance creation
//!
//! Validates required and optional instance extensions and validation layers
//! before creating the instance, and routes validation messages into the
//! injected [`Logger`] through a debug messenger.

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use std::borrow::Cow;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;

use crate::core::config::InstanceConfig;
use crate::foundation::logging::Logger;
use crate::render::backends::vulkan::{VkResultExt, VulkanError, VulkanResult};

/// Convert configured names into C strings
pub(crate) fn to_cstrings(names: &[String]) -> VulkanResult<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_str()).map_err(|_| {
                VulkanError::Configuration(format!("Name contains a NUL byte: {name:?}"))
            })
        })
        .collect()
}

/// Copy a fixed-size Vulkan name array into an owned string
pub(crate) fn name_from_raw(raw: &[c_char]) -> CString {
    // Vulkan guarantees NUL termination within the array
    unsafe { CStr::from_ptr(raw.as_ptr()) }.to_owned()
}

/// Decide which instance extensions to enable.
///
/// Every required extension must be available. Optional extensions are
/// enabled when available and skipped otherwise. The result keeps request
/// order and holds no duplicates.
pub fn resolve_extensions(
    available: &[CString],
    required: &[CString],
    optional: &[CString],
) -> VulkanResult<Vec<CString>> {
    let mut enabled: Vec<CString> = Vec::with_capacity(required.len() + optional.len());

    for name in required {
        if !available.contains(name) {
            return Err(VulkanError::Configuration(format!(
                "Required instance extension {} is not supported",
                name.to_string_lossy()
            )));
        }
        if !enabled.contains(name) {
            enabled.push(name.clone());
        }
    }

    for name in optional {
        if available.contains(name) && !enabled.contains(name) {
            enabled.push(name.clone());
        }
    }

    Ok(enabled)
}

/// Fail if any requested layer is missing
pub fn check_layers(available: &[CString], requested: &[CString]) -> VulkanResult<()> {
    let missing: Vec<String> = requested
        .iter()
        .filter(|layer| !available.contains(layer))
        .map(|layer| layer.to_string_lossy().into_owned())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(VulkanError::Configuration(format!(
            "Validation layers not available: {}",
            missing.join(", ")
        )))
    }
}

struct DebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
    // Referenced by the callback until the messenger is destroyed
    _callback_logger: Box<Logger>,
}

/// Vulkan instance wrapper with RAII cleanup
pub struct GraphicsInstance {
    entry: Entry,
    instance: Instance,
    enabled_extensions: Vec<CString>,
    enabled_layers: Vec<CString>,
    debug: Option<DebugMessenger>,
    logger: Logger,
}

impl GraphicsInstance {
    /// Load the Vulkan runtime and create an instance.
    ///
    /// `platform_extensions` are required in addition to the configured
    /// required extensions; the surface provider supplies them.
    pub fn new(
        config: &InstanceConfig,
        platform_extensions: &[CString],
        logger: &Logger,
    ) -> VulkanResult<Self> {
        let logger = logger.with_target("render_core::instance");
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::Loading(e.to_string()))?;

        let available_extensions: Vec<CString> = entry
            .enumerate_instance_extension_properties(None)
            .context("vkEnumerateInstanceExtensionProperties")?
            .iter()
            .map(|props| name_from_raw(&props.extension_name))
            .collect();

        let mut required = platform_extensions.to_vec();
        required.extend(to_cstrings(&config.required_extensions)?);
        let optional = to_cstrings(&config.optional_extensions)?;
        let enabled_extensions = resolve_extensions(&available_extensions, &required, &optional)
            .map_err(|e| {
                logger.error(format_args!("Instance creation failed: {e}"));
                e
            })?;

        for skipped in optional.iter().filter(|name| !enabled_extensions.contains(name)) {
            logger.debug(format_args!(
                "Optional instance extension {} not available, skipping",
                skipped.to_string_lossy()
            ));
        }

        let enabled_layers = if config.validation_enabled() {
            let requested = to_cstrings(&config.validation_layers)?;
            let available_layers: Vec<CString> = entry
                .enumerate_instance_layer_properties()
                .context("vkEnumerateInstanceLayerProperties")?
                .iter()
                .map(|props| name_from_raw(&props.layer_name))
                .collect();
            check_layers(&available_layers, &requested).map_err(|e| {
                logger.error(format_args!("Instance creation failed: {e}"));
                e
            })?;
            requested
        } else {
            Vec::new()
        };

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|_| VulkanError::Configuration("Application name contains NUL".to_string()))?;
        let engine_name = CString::new(config.engine_name.as_str())
            .map_err(|_| VulkanError::Configuration("Engine name contains NUL".to_string()))?;
        let (major, minor, patch) = config.application_version;
        let (api_major, api_minor) = config.api_version;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::make_api_version(0, api_major, api_minor, 0));

        let extension_ptrs: Vec<*const c_char> =
            enabled_extensions.iter().map(|name| name.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> =
            enabled_layers.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("vkCreateInstance")
            .map_err(|e| {
                logger.error(format_args!("Instance creation failed: {e}"));
                e
            })?;

        let wants_messenger = !enabled_layers.is_empty()
            && enabled_extensions.iter().any(|name| name.as_c_str() == DebugUtils::name());
        let debug = if wants_messenger {
            match Self::create_debug_messenger(&entry, &instance, &logger) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    logger.error(format_args!("Debug messenger creation failed: {e}"));
                    return Err(e);
                }
            }
        } else {
            None
        };

        logger.info(format_args!(
            "Vulkan instance created for {} ({} extensions, {} layers)",
            config.application_name,
            enabled_extensions.len(),
            enabled_layers.len()
        ));

        Ok(Self {
            entry,
            instance,
            enabled_extensions,
            enabled_layers,
            debug,
            logger,
        })
    }

    fn create_debug_messenger(
        entry: &Entry,
        instance: &Instance,
        logger: &Logger,
    ) -> VulkanResult<DebugMessenger> {
        let loader = DebugUtils::new(entry, instance);
        let callback_logger = Box::new(logger.with_target("render_core::validation"));

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(std::ptr::addr_of!(*callback_logger) as *mut c_void);

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .context("vkCreateDebugUtilsMessengerEXT")?;

        Ok(DebugMessenger {
            loader,
            messenger,
            _callback_logger: callback_logger,
        })
    }

    /// Vulkan entry point
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Raw instance
    pub fn raw(&self) -> &Instance {
        &self.instance
    }

    /// Extensions that were enabled
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    /// Whether `name` was enabled
    pub fn is_extension_enabled(&self, name: &CStr) -> bool {
        self.enabled_extensions.iter().any(|enabled| enabled.as_c_str() == name)
    }

    /// Layers that were enabled
    pub fn enabled_layers(&self) -> &[CString] {
        &self.enabled_layers
    }

    /// Whether validation messages are routed to the logger
    pub fn has_debug_messenger(&self) -> bool {
        self.debug.is_some()
    }
}

impl Drop for GraphicsInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug
                    .loader
                    .destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        self.logger.debug("Vulkan instance destroyed");
    }
}

/// Forwards validation messages to the logger passed as user data
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }
    let logger = &*(user_data as *const Logger);
    let callback_data = &*callback_data;
    let message = if callback_data.p_message.is_null() {
        Cow::Borrowed("<no message>")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        logger.error(format_args!("[Vulkan] {message_type:?} - {message}"));
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        logger.warn(format_args!("[Vulkan] {message_type:?} - {message}"));
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        logger.debug(format_args!("[Vulkan] {message_type:?} - {message}"));
    } else {
        logger.trace(format_args!("[Vulkan] {message_type:?} - {message}"));
    }

    vk::FALSE
}
